//! # Due-Dose Resolver
//!
//! Turns a wall-clock timestamp into the set of dose slots due at that minute.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.1.0: Optional catch-up window for late ticks
//! - 1.0.0: Exact-minute matching

use crate::database::{Database, DoseRow};
use crate::features::reminders::error::{ReminderError, ReminderResult};
use crate::features::reminders::slot::{DoseSlot, TimeOfDay};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, warn};
use std::sync::Arc;

/// Read-only access to the schedule data maintained elsewhere
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Rows with a time of day in `[from, to]` whose treatment covers `date`
    async fn dose_rows(
        &self,
        date: NaiveDate,
        from: TimeOfDay,
        to: TimeOfDay,
    ) -> ReminderResult<Vec<DoseRow>>;
}

#[async_trait]
impl ScheduleStore for Database {
    async fn dose_rows(
        &self,
        date: NaiveDate,
        from: TimeOfDay,
        to: TimeOfDay,
    ) -> ReminderResult<Vec<DoseRow>> {
        self.due_dose_rows(date, from, to)
            .await
            .map_err(|e| ReminderError::StoreUnavailable(format!("{e:#}")))
    }
}

pub struct DueDoseResolver {
    store: Arc<dyn ScheduleStore>,
    catchup_minutes: u32,
}

impl DueDoseResolver {
    pub fn new(store: Arc<dyn ScheduleStore>) -> Self {
        Self {
            store,
            catchup_minutes: 0,
        }
    }

    /// Also match slots up to `minutes` earlier on the same date
    pub fn with_catchup_minutes(mut self, minutes: u32) -> Self {
        self.catchup_minutes = minutes;
        self
    }

    /// Slots due at `now`, truncated to the minute. Rows that fail validation
    /// are skipped with a warning.
    pub async fn resolve_due(&self, now: NaiveDateTime) -> ReminderResult<Vec<DoseSlot>> {
        let date = now.date();
        let until = TimeOfDay::from_time(now.time());
        let from = until.saturating_sub_minutes(self.catchup_minutes);

        let rows = self.store.dose_rows(date, from, until).await?;

        let mut slots = Vec::with_capacity(rows.len());
        for row in rows {
            match DoseSlot::try_from(row) {
                Ok(slot) if slot.is_active_on(date) && (from..=until).contains(&slot.time_of_day) => {
                    slots.push(slot)
                }
                Ok(slot) => debug!(
                    "Store returned medicine {} outside {date} {from}-{until}, ignoring",
                    slot.medicine_id
                ),
                Err(e) => warn!("Skipping schedule row: {e}"),
            }
        }

        debug!("Resolved {} due dose(s) for {date} {until}", slots.len());
        Ok(slots)
    }
}
