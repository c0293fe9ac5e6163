//! # Delivery Gateway
//!
//! Outbound notification channels. The dispatch tick only sees the
//! `DeliveryGateway` trait; a failed send is a value, never a panic or an
//! early return out of the tick.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.1.0: Log-only gateway for running without SMS credentials
//! - 1.0.0: Twilio SMS gateway

use crate::core::config::TwilioSettings;
use crate::features::reminders::error::DeliveryError;
use crate::features::reminders::slot::DeliveryId;
use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;

#[async_trait]
pub trait DeliveryGateway: Send + Sync {
    /// Hand `text` to the channel for `recipient`
    async fn send(&self, recipient: &str, text: &str) -> Result<DeliveryId, DeliveryError>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

#[derive(Debug, Deserialize)]
struct TwilioMessage {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    code: Option<i64>,
    message: Option<String>,
}

/// SMS delivery through the Twilio Messages API
pub struct TwilioGateway {
    client: reqwest::Client,
    settings: TwilioSettings,
}

impl TwilioGateway {
    pub fn new(settings: TwilioSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.settings.api_base.trim_end_matches('/'),
            self.settings.account_sid
        )
    }
}

#[async_trait]
impl DeliveryGateway for TwilioGateway {
    async fn send(&self, recipient: &str, text: &str) -> Result<DeliveryId, DeliveryError> {
        let params = [
            ("To", recipient),
            ("From", self.settings.from_number.as_str()),
            ("Body", text),
        ];

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.settings.account_sid, Some(&self.settings.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = match serde_json::from_str::<TwilioErrorBody>(&body) {
                Ok(TwilioErrorBody {
                    code: Some(code),
                    message: Some(message),
                }) => format!("{message} (code {code})"),
                Ok(TwilioErrorBody {
                    message: Some(message),
                    ..
                }) => message,
                _ => body,
            };
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                reason,
            });
        }

        let message: TwilioMessage = response
            .json()
            .await
            .map_err(|e| DeliveryError::Transport(format!("unreadable response: {e}")))?;

        debug!("Twilio accepted message {} for {recipient}", message.sid);
        Ok(DeliveryId(message.sid))
    }

    fn name(&self) -> &'static str {
        "twilio"
    }
}

/// Writes reminders to the log instead of sending them
#[derive(Debug, Default)]
pub struct LogOnlyGateway;

#[async_trait]
impl DeliveryGateway for LogOnlyGateway {
    async fn send(&self, recipient: &str, text: &str) -> Result<DeliveryId, DeliveryError> {
        let id = format!("log-{}", uuid::Uuid::new_v4());
        info!("📨 [dry run] {recipient}: {text} ({id})");
        Ok(DeliveryId(id))
    }

    fn name(&self) -> &'static str {
        "log-only"
    }
}
