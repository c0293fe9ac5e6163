//! Twilio Gateway Contract Tests
//!
//! Verify the Messages API request format and how provider responses map to
//! delivery ids and `DeliveryError`s.

use medalert::core::TwilioSettings;
use medalert::features::reminders::{DeliveryError, DeliveryGateway, TwilioGateway};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MESSAGES_PATH: &str = "/2010-04-01/Accounts/AC123/Messages.json";

fn gateway(server: &MockServer) -> TwilioGateway {
    TwilioGateway::new(TwilioSettings {
        account_sid: "AC123".to_string(),
        auth_token: "secret".to_string(),
        from_number: "+15005550006".to_string(),
        api_base: server.uri(),
    })
}

#[tokio::test]
async fn test_send_posts_form_with_basic_auth() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .and(header_exists("authorization"))
        .and(body_string_contains("To=%2B15550001111"))
        .and(body_string_contains("From=%2B15005550006"))
        .and(body_string_contains("Body="))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "sid": "SM0123456789",
            "status": "queued"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = gateway(&server)
        .send("+15550001111", "time to take your medicine")
        .await
        .unwrap();

    assert_eq!(id.0, "SM0123456789");
}

#[tokio::test]
async fn test_provider_error_maps_to_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": 21211,
            "message": "The 'To' number is not a valid phone number.",
            "status": 400
        })))
        .mount(&server)
        .await;

    let result = gateway(&server).send("not-a-number", "hello").await;

    match result {
        Err(DeliveryError::Rejected { status, reason }) => {
            assert_eq!(status, 400);
            assert!(reason.contains("not a valid phone number"));
            assert!(reason.contains("21211"));
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_non_json_error_body_kept_verbatim() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let result = gateway(&server).send("+15550001111", "hello").await;

    assert_eq!(
        result,
        Err(DeliveryError::Rejected {
            status: 503,
            reason: "upstream unavailable".to_string()
        })
    );
}

#[tokio::test]
async fn test_success_without_sid_is_transport_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"status": "queued"})))
        .mount(&server)
        .await;

    let result = gateway(&server).send("+15550001111", "hello").await;
    assert!(matches!(result, Err(DeliveryError::Transport(_))));
}
