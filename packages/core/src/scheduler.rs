//! Overdue scan scheduler.
//!
//! Drives the periodic scan loop: each tick runs one [`OverdueScanner`]
//! pass dated today (local calendar), so members hear about overdue items
//! without anyone calling the scanner by hand.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use rand::Rng;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::loans::{OverdueScanner, ScanReport};

/// How often to scan, plus an optional random delay added before each pass
/// so that several instances don't hit the mail relay in lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSchedule {
    pub interval: Duration,
    pub max_jitter: Duration,
}

impl ScanSchedule {
    pub fn new(interval_seconds: u64, jitter_seconds: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval_seconds.max(1)),
            max_jitter: Duration::from_secs(jitter_seconds),
        }
    }

    fn next_jitter(&self) -> Duration {
        if self.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        let millis = self.max_jitter.as_millis().min(u64::MAX as u128) as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
    }
}

/// Run the overdue scan loop.
///
/// Scan failures are per-loan and already contained by the scanner, so a
/// bad tick never takes the loop down.
///
/// Runs until `shutdown` flips to `true` or its sender is dropped.
pub async fn run_overdue_scans(
    scanner: Arc<OverdueScanner>,
    schedule: ScanSchedule,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = time::interval(schedule.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        "Overdue scans started (interval: {}s, jitter up to {}s)",
        schedule.interval.as_secs(),
        schedule.max_jitter.as_secs()
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let jitter = schedule.next_jitter();
                if !jitter.is_zero() && !sleep_unless_shutdown(jitter, &mut shutdown).await {
                    tracing::info!("Shutdown signal received. Stopping overdue scans.");
                    break;
                }
                scan_once(&scanner, Local::now().date_naive()).await;
            }

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::info!("Shutdown signal received. Stopping overdue scans.");
                    break;
                }
            }
        }
    }

    tracing::info!("Overdue scans stopped cleanly");
}

/// Sleep for `delay`. `false` if shutdown was requested first; a signal
/// that leaves the value at `false` does not cut the sleep short.
async fn sleep_unless_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let sleep = time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return false;
                }
            }
        }
    }
}

/// Execute a single scan pass. Extracted for testability.
async fn scan_once(scanner: &OverdueScanner, today: NaiveDate) -> ScanReport {
    let report = scanner.scan(today).await;
    if report.notified > 0 || report.failed > 0 {
        tracing::info!(
            "Overdue scan complete: {} notified, {} failed, {} active loans",
            report.notified,
            report.failed,
            report.examined
        );
    }
    report
}
