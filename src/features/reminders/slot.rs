//! # Dose Slots
//!
//! Typed schedule values produced at the resolver boundary. Store rows are
//! validated once here so the tick never inspects raw columns.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0

use crate::database::DoseRow;
use crate::features::reminders::error::ReminderError;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::fmt;
use std::str::FromStr;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub type UserId = i64;
pub type MedicineId = i64;

/// Wall-clock time with minute resolution, rendered as `HH:MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(TimeOfDay { hour, minute })
    }

    /// Truncates seconds and below
    pub fn from_time(time: NaiveTime) -> Self {
        TimeOfDay {
            hour: time.hour() as u8,
            minute: time.minute() as u8,
        }
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// Steps back `minutes`, stopping at 00:00 of the same day
    pub fn saturating_sub_minutes(self, minutes: u32) -> Self {
        let total = (u32::from(self.hour) * 60 + u32::from(self.minute)).saturating_sub(minutes);
        TimeOfDay {
            hour: (total / 60) as u8,
            minute: (total % 60) as u8,
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = ReminderError;

    /// Accepts `HH:MM` or `HH:MM:SS`; seconds are dropped
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
            .map(TimeOfDay::from_time)
            .map_err(|_| ReminderError::InvalidSlot(format!("invalid time of day '{s}'")))
    }
}

/// Identifier returned by the delivery gateway for an accepted message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeliveryId(pub String);

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One scheduled medicine dose for one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoseSlot {
    pub user_id: UserId,
    pub user_name: String,
    pub medicine_id: MedicineId,
    pub medicine_name: String,
    pub recipient: String,
    pub time_of_day: TimeOfDay,
    /// Inclusive
    pub active_from: NaiveDate,
    /// Inclusive
    pub active_until: NaiveDate,
}

impl DoseSlot {
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.active_from <= date && date <= self.active_until
    }

    pub fn is_due(&self, date: NaiveDate, time: TimeOfDay) -> bool {
        self.is_active_on(date) && self.time_of_day == time
    }

    /// Natural key of this slot's occurrence on `date`
    pub fn key_on(&self, date: NaiveDate) -> ReminderKey {
        ReminderKey {
            user_id: self.user_id,
            medicine_id: self.medicine_id,
            date,
            time_of_day: self.time_of_day,
        }
    }

    pub fn reminder_text(&self) -> String {
        format!(
            "⏰ Hello {}, it's time to take your medicine: {}",
            self.user_name, self.medicine_name
        )
    }
}

impl TryFrom<DoseRow> for DoseSlot {
    type Error = ReminderError;

    fn try_from(row: DoseRow) -> Result<Self, Self::Error> {
        let parse_date = |raw: &str, column: &str| {
            NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|_| {
                ReminderError::InvalidSlot(format!(
                    "medicine {} has invalid {column} '{raw}'",
                    row.medicine_id
                ))
            })
        };

        let active_from = parse_date(&row.start_date, "start_date")?;
        let active_until = parse_date(&row.end_date, "end_date")?;
        if active_until < active_from {
            return Err(ReminderError::InvalidSlot(format!(
                "medicine {} ends ({active_until}) before it starts ({active_from})",
                row.medicine_id
            )));
        }

        let recipient = row.phone.unwrap_or_default().trim().to_string();
        if recipient.is_empty() {
            return Err(ReminderError::InvalidSlot(format!(
                "user {} has no phone number",
                row.user_id
            )));
        }

        Ok(DoseSlot {
            user_id: row.user_id,
            user_name: row.user_name,
            medicine_id: row.medicine_id,
            medicine_name: row.medicine_name,
            recipient,
            time_of_day: row.specific_time.parse()?,
            active_from,
            active_until,
        })
    }
}

/// Natural key of one dose-slot occurrence: `(user, medicine, date, time)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReminderKey {
    pub user_id: UserId,
    pub medicine_id: MedicineId,
    pub date: NaiveDate,
    pub time_of_day: TimeOfDay,
}

impl fmt::Display for ReminderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "user {} medicine {} at {} {}",
            self.user_id,
            self.medicine_id,
            self.date.format(DATE_FORMAT),
            self.time_of_day
        )
    }
}

/// Immutable ledger entry; `delivery_id == None` records a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderRecord {
    pub key: ReminderKey,
    pub delivery_id: Option<DeliveryId>,
    pub attempted_at: NaiveDateTime,
}
