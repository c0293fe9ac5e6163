//! # Reminder Scheduler
//!
//! Owns the recurring timer that drives `DispatchTick`. Ticks run one after
//! another on a single task, so a slow tick delays the next one instead of
//! overlapping it; intervals missed meanwhile are skipped.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 2.0.0: Explicit start/stop lifecycle with injectable clock
//! - 1.0.0: Fixed one-minute loop

use crate::features::reminders::tick::{DispatchTick, TickOutcome};
use chrono::{NaiveDateTime, Timelike};
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Source of the wall-clock time fed to each tick
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall clock; medicine times are entered in the patient's local time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

pub struct ReminderScheduler {
    tick: Arc<DispatchTick>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    align_to_minute: bool,
}

impl ReminderScheduler {
    pub fn new(tick: Arc<DispatchTick>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            tick,
            clock,
            interval,
            align_to_minute: true,
        }
    }

    /// When enabled (the default) the first tick waits for the next minute boundary
    pub fn with_minute_alignment(mut self, align: bool) -> Self {
        self.align_to_minute = align;
        self
    }

    /// Run a single tick now, outside the timer
    pub async fn run_once(&self) -> TickOutcome {
        self.tick.run(self.clock.now()).await
    }

    /// Spawn the timer loop. The returned handle stops it.
    pub fn start(self) -> SchedulerHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(stop_rx));
        SchedulerHandle {
            stop: stop_tx,
            task,
        }
    }

    async fn run(self, mut stop: oneshot::Receiver<()>) -> u64 {
        let delay = if self.align_to_minute {
            delay_to_next_minute(self.clock.now())
        } else {
            Duration::ZERO
        };

        info!(
            "⏰ Reminder scheduler started (every {}s, first tick in {}ms)",
            self.interval.as_secs(),
            delay.as_millis()
        );

        let mut timer = interval_at(Instant::now() + delay, self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut ticks = 0;
        loop {
            tokio::select! {
                _ = &mut stop => break,
                _ = timer.tick() => {
                    // Stop requests are only observed between ticks
                    self.tick.run(self.clock.now()).await;
                    ticks += 1;
                }
            }
        }

        info!("Reminder scheduler stopped after {ticks} tick(s)");
        ticks
    }
}

pub struct SchedulerHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<u64>,
}

impl SchedulerHandle {
    /// Stop after any in-flight tick completes; returns the number of ticks run
    pub async fn stop(self) -> u64 {
        // The loop may already have exited if its task panicked
        let _ = self.stop.send(());
        match self.task.await {
            Ok(ticks) => ticks,
            Err(e) => {
                error!("Reminder scheduler task failed: {e}");
                0
            }
        }
    }
}

/// Time until the next `:00` second, plus a small margin so the clock reads the new minute
fn delay_to_next_minute(now: NaiveDateTime) -> Duration {
    let into_minute = Duration::from_secs(u64::from(now.second()))
        + Duration::from_nanos(u64::from(now.nanosecond() % 1_000_000_000));
    Duration::from_secs(60).saturating_sub(into_minute) + Duration::from_millis(250)
}
