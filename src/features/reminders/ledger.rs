//! # Reminder Ledger
//!
//! Append-only record of every dose-slot occurrence a dispatch was attempted
//! for. The storage-level unique key on `(user, medicine, date, time)` is what
//! enforces at-most-once; `has_record` only saves a gateway call.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0

use crate::database::Database;
use crate::features::reminders::error::{ReminderError, ReminderResult};
use crate::features::reminders::slot::{DeliveryId, ReminderKey};
use async_trait::async_trait;
use chrono::NaiveDateTime;

#[async_trait]
pub trait ReminderLedger: Send + Sync {
    /// Whether a record already exists for `key`
    async fn has_record(&self, key: &ReminderKey) -> ReminderResult<bool>;

    /// Insert-if-absent. Fails with `DuplicateKey` when `key` is already recorded.
    async fn record(
        &self,
        key: &ReminderKey,
        delivery_id: Option<&DeliveryId>,
        attempted_at: NaiveDateTime,
    ) -> ReminderResult<()>;
}

/// Ledger backed by the `reminder_log` table
#[derive(Clone)]
pub struct SqliteLedger {
    database: Database,
}

impl SqliteLedger {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

#[async_trait]
impl ReminderLedger for SqliteLedger {
    async fn has_record(&self, key: &ReminderKey) -> ReminderResult<bool> {
        self.database
            .reminder_exists(key)
            .await
            .map_err(|e| ReminderError::LedgerReadFailed {
                key: *key,
                reason: format!("{e:#}"),
            })
    }

    async fn record(
        &self,
        key: &ReminderKey,
        delivery_id: Option<&DeliveryId>,
        attempted_at: NaiveDateTime,
    ) -> ReminderResult<()> {
        match self
            .database
            .insert_reminder(key, delivery_id, attempted_at)
            .await
        {
            Ok(true) => Ok(()),
            Ok(false) => Err(ReminderError::DuplicateKey(*key)),
            Err(e) => Err(ReminderError::LedgerWriteFailed {
                key: *key,
                reason: format!("{e:#}"),
            }),
        }
    }
}
