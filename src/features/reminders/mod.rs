//! # Reminders Feature
//!
//! Medication reminder dispatch: each minute the scheduler resolves the doses
//! due now, skips any already in the ledger, sends the rest through the
//! delivery gateway and records every attempt exactly once.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 2.0.0: Split into resolver, ledger, gateway, tick and scheduler
//! - 1.0.0: Initial single-loop scheduler

pub mod error;
pub mod gateway;
pub mod ledger;
pub mod resolver;
pub mod scheduler;
pub mod slot;
pub mod tick;

pub use error::{DeliveryError, ReminderError, ReminderResult};
pub use gateway::{DeliveryGateway, LogOnlyGateway, TwilioGateway};
pub use ledger::{ReminderLedger, SqliteLedger};
pub use resolver::{DueDoseResolver, ScheduleStore};
pub use scheduler::{Clock, ReminderScheduler, SchedulerHandle, SystemClock};
pub use slot::{DeliveryId, DoseSlot, ReminderKey, ReminderRecord, TimeOfDay};
pub use tick::{DispatchTick, SlotOutcome, TickOutcome, TickReport};
