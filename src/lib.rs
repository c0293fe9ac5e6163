// Core layer - shared configuration
pub mod core;

// Features layer - reminder dispatch engine
pub mod features;

// Infrastructure - SQLite schedule store and ledger
pub mod database;

pub use crate::core::Config;
pub use database::Database;

pub use features::reminders::{
    DeliveryGateway, DispatchTick, DueDoseResolver, LogOnlyGateway, ReminderScheduler,
    SqliteLedger, SystemClock, TwilioGateway,
};
