//! Error types for the reminder dispatch engine.

use crate::features::reminders::slot::ReminderKey;

/// Failures surfaced by the resolver, ledger and dispatch tick.
#[derive(Debug, thiserror::Error)]
pub enum ReminderError {
    /// The schedule store could not be read; aborts the whole tick.
    #[error("schedule store unavailable: {0}")]
    StoreUnavailable(String),

    /// A single send was rejected or timed out.
    #[error("delivery failed: {0}")]
    DeliveryFailed(#[from] DeliveryError),

    /// A ledger record already exists for this dose-slot occurrence.
    #[error("reminder already recorded for {0}")]
    DuplicateKey(ReminderKey),

    /// The ledger could not be queried before dispatch.
    #[error("ledger lookup failed for {key}: {reason}")]
    LedgerReadFailed { key: ReminderKey, reason: String },

    /// Storage error other than a duplicate key.
    #[error("ledger write failed for {key}: {reason}")]
    LedgerWriteFailed { key: ReminderKey, reason: String },

    /// A schedule row failed validation at the resolver boundary.
    #[error("invalid dose slot: {0}")]
    InvalidSlot(String),
}

/// Why the delivery gateway could not hand off a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("provider rejected message (status {status}): {reason}")]
    Rejected { status: u16, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("send timed out after {millis}ms")]
    Timeout { millis: u64 },
}

pub type ReminderResult<T> = Result<T, ReminderError>;
