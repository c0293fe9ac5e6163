//! # Dispatch Tick
//!
//! One pass of reminder dispatch: resolve due slots, skip those already in the
//! ledger, send the rest, and record every attempt whatever its outcome.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.1.0: Per-send timeout; overlapping calls are serialised
//! - 1.0.0: Initial release

use crate::features::reminders::error::{DeliveryError, ReminderError};
use crate::features::reminders::gateway::DeliveryGateway;
use crate::features::reminders::ledger::ReminderLedger;
use crate::features::reminders::resolver::DueDoseResolver;
use crate::features::reminders::slot::{DeliveryId, DoseSlot};
use chrono::NaiveDateTime;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Terminal state of a single due slot within one tick
#[derive(Debug)]
pub enum SlotOutcome {
    /// Sent and recorded with its delivery id
    Delivered(DeliveryId),
    /// Send failed; recorded with a null delivery id
    DeliveryFailed(DeliveryError),
    /// A ledger record already existed
    AlreadyHandled,
    /// Ledger lookup or write failed; outcome not recorded
    LedgerError(ReminderError),
}

/// Per-tick counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub due: usize,
    pub delivered: usize,
    pub failed: usize,
    pub already_handled: usize,
    pub ledger_errors: usize,
}

impl TickReport {
    fn tally(&mut self, outcome: &SlotOutcome) {
        match outcome {
            SlotOutcome::Delivered(_) => self.delivered += 1,
            SlotOutcome::DeliveryFailed(_) => self.failed += 1,
            SlotOutcome::AlreadyHandled => self.already_handled += 1,
            SlotOutcome::LedgerError(_) => self.ledger_errors += 1,
        }
    }
}

#[derive(Debug)]
pub enum TickOutcome {
    Complete(TickReport),
    /// Schedule could not be read; nothing was sent or recorded
    Aborted(ReminderError),
}

impl TickOutcome {
    pub fn report(&self) -> Option<&TickReport> {
        match self {
            TickOutcome::Complete(report) => Some(report),
            TickOutcome::Aborted(_) => None,
        }
    }
}

pub struct DispatchTick {
    resolver: DueDoseResolver,
    ledger: Arc<dyn ReminderLedger>,
    gateway: Arc<dyn DeliveryGateway>,
    send_timeout: Duration,
    running: Mutex<()>,
}

impl DispatchTick {
    pub fn new(
        resolver: DueDoseResolver,
        ledger: Arc<dyn ReminderLedger>,
        gateway: Arc<dyn DeliveryGateway>,
    ) -> Self {
        Self {
            resolver,
            ledger,
            gateway,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            running: Mutex::new(()),
        }
    }

    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    /// Run one tick for `now`. A second call made while one is in flight
    /// waits for the first to finish.
    pub async fn run(&self, now: NaiveDateTime) -> TickOutcome {
        let _running = self.running.lock().await;

        debug!("⏳ Checking reminders for {now}");

        let slots = match self.resolver.resolve_due(now).await {
            Ok(slots) => slots,
            Err(e) => {
                error!("Reminder tick at {now} aborted: {e}");
                return TickOutcome::Aborted(e);
            }
        };

        let mut report = TickReport {
            due: slots.len(),
            ..TickReport::default()
        };

        if slots.is_empty() {
            debug!("No reminders right now");
            return TickOutcome::Complete(report);
        }

        for slot in &slots {
            let outcome = self.dispatch_slot(slot, now).await;
            report.tally(&outcome);
        }

        info!(
            "Reminder tick {now}: {} due, {} delivered, {} failed, {} already handled, {} ledger error(s)",
            report.due, report.delivered, report.failed, report.already_handled, report.ledger_errors
        );

        TickOutcome::Complete(report)
    }

    async fn dispatch_slot(&self, slot: &DoseSlot, now: NaiveDateTime) -> SlotOutcome {
        let key = slot.key_on(now.date());

        match self.ledger.has_record(&key).await {
            Ok(true) => {
                debug!("Already sent → {} ({key})", slot.medicine_name);
                return SlotOutcome::AlreadyHandled;
            }
            Ok(false) => {}
            Err(e) => {
                error!("Skipping {}: {e}", slot.medicine_name);
                return SlotOutcome::LedgerError(e);
            }
        }

        let delivery = self.deliver(slot).await;

        let recorded = self.ledger.record(&key, delivery.as_ref().ok(), now).await;

        match recorded {
            Ok(()) => match delivery {
                Ok(id) => SlotOutcome::Delivered(id),
                Err(e) => SlotOutcome::DeliveryFailed(e),
            },
            Err(ReminderError::DuplicateKey(_)) => {
                debug!("Reminder for {key} recorded concurrently, treating as handled");
                SlotOutcome::AlreadyHandled
            }
            Err(e) => {
                error!("Reminder outcome lost: {e}");
                SlotOutcome::LedgerError(e)
            }
        }
    }

    async fn deliver(&self, slot: &DoseSlot) -> Result<DeliveryId, DeliveryError> {
        let text = slot.reminder_text();

        match timeout(self.send_timeout, self.gateway.send(&slot.recipient, &text)).await {
            Ok(Ok(id)) => {
                info!(
                    "📨 {} reminder sent → {} for {} ({id})",
                    self.gateway.name(),
                    slot.recipient,
                    slot.medicine_name
                );
                Ok(id)
            }
            Ok(Err(e)) => {
                warn!(
                    "Reminder to {} (user {}) for {} failed: {e}",
                    slot.recipient, slot.user_id, slot.medicine_name
                );
                Err(e)
            }
            Err(_) => {
                let e = DeliveryError::Timeout {
                    millis: self.send_timeout.as_millis() as u64,
                };
                warn!(
                    "Reminder to {} (user {}) for {} failed: {e}",
                    slot.recipient, slot.user_id, slot.medicine_name
                );
                Err(e)
            }
        }
    }
}
