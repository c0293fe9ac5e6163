use anyhow::Result;
use dotenvy::dotenv;
use log::{error, info, warn};
use std::sync::Arc;

use medalert::core::Config;
use medalert::database::Database;
use medalert::features::reminders::{
    DeliveryGateway, DispatchTick, DueDoseResolver, LogOnlyGateway, ReminderScheduler,
    SqliteLedger, SystemClock, TwilioGateway,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("Starting MediAlert reminder service...");

    let database = Database::new(&config.database_path).await?;

    let gateway: Arc<dyn DeliveryGateway> = match config.twilio.clone() {
        Some(settings) => {
            info!("📨 SMS reminders via Twilio from {}", settings.from_number);
            Arc::new(TwilioGateway::new(settings))
        }
        None => {
            warn!("Twilio credentials not set - reminders will only be logged");
            Arc::new(LogOnlyGateway)
        }
    };

    let resolver = DueDoseResolver::new(Arc::new(database.clone()))
        .with_catchup_minutes(config.catchup_minutes);
    if config.catchup_minutes > 0 {
        info!(
            "Late ticks catch up on doses from the previous {} minute(s)",
            config.catchup_minutes
        );
    }

    let tick = DispatchTick::new(resolver, Arc::new(SqliteLedger::new(database)), gateway)
        .with_send_timeout(config.delivery_timeout);

    let handle = ReminderScheduler::new(
        Arc::new(tick),
        Arc::new(SystemClock),
        config.tick_interval,
    )
    .start();

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }

    info!("Shutdown requested, waiting for the current tick to finish...");
    handle.stop().await;

    Ok(())
}
