//! Testing-mode loan watcher.
//!
//! Runs its own polling task, separate from the overdue scanner. Each tick
//! it finds testing-mode loans whose wall-clock window has run out, emails
//! the member, removes the loan from the store entirely and releases the
//! item in the catalog. Expired testing loans leave no return record
//! behind. A loan returned while its notice is in flight is left alone.
//!
//! Lifecycle is `Stopped -> Running -> Stopped`, driven by the owner via
//! [`TestingModeWatcher::start`] / [`TestingModeWatcher::stop`]. A stop
//! request is honored between ticks, never in the middle of one.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::alerts::email::EmailSender;
use crate::directory::{MediaCatalog, MemberDirectory};
use crate::metrics::AppMetrics;
use crate::store::LoanStore;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
pub const TESTING_SUBJECT: &str = "[TESTING MODE] Loan expired";

/// Outcome of one poll tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub expired: usize,
    /// Notified and removed from the store.
    pub evicted: usize,
    /// Member or contact address could not be resolved.
    pub skipped: usize,
    /// Email failed; the loan stays and is retried next tick.
    pub failed: usize,
}

/// Everything one tick needs; cheap to clone into the polling task.
#[derive(Clone)]
struct WatcherContext {
    store: Arc<LoanStore>,
    members: Arc<dyn MemberDirectory>,
    catalog: Arc<dyn MediaCatalog>,
    email: Arc<dyn EmailSender>,
    metrics: Arc<AppMetrics>,
}

impl WatcherContext {
    async fn poll_once(&self, now: DateTime<Utc>) -> PollReport {
        let expired = self.store.find_expired_testing(now).await;
        let mut report = PollReport {
            expired: expired.len(),
            ..PollReport::default()
        };

        for loan in expired {
            let member = self.members.find_member(loan.member_id()).await;
            let Some(address) = member.as_ref().and_then(|m| m.contact_address()) else {
                tracing::debug!("Skipping expired testing {}: member {} unresolved", loan.id(), loan.member_id());
                report.skipped += 1;
                continue;
            };

            let body = format!(
                "Dear member,\n\n\
                 This is an automated notification to inform you that your testing-mode loan \
                 for the media item ({}) has expired.\n\
                 Please take the necessary action.\n\n\
                 Best regards,\n\
                 Library Management System",
                loan.media_id()
            );

            match self.email.send(address, TESTING_SUBJECT, &body).await {
                Ok(()) => {
                    if self.store.remove_active(loan.id()).await.is_none() {
                        tracing::debug!("[TESTING MODE] {} was returned during its expiry notice", loan.id());
                        continue;
                    }
                    if !self.catalog.mark_available(loan.media_id()).await {
                        tracing::warn!("[TESTING MODE] media {} missing from the catalog", loan.media_id());
                    }
                    self.metrics.testing_loans_expired_total.inc();
                    report.evicted += 1;
                    tracing::info!("[TESTING MODE] {} expired; {} notified", loan.id(), address);
                }
                Err(err) => {
                    self.metrics.notification_failures_total.inc();
                    report.failed += 1;
                    tracing::warn!("[TESTING MODE] expiry notice for {} failed: {}", loan.id(), err);
                }
            }
        }

        report
    }
}

struct RunningWatcher {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct TestingModeWatcher {
    context: WatcherContext,
    poll_interval: Duration,
    running: Option<RunningWatcher>,
}

impl TestingModeWatcher {
    /// Create a stopped watcher. Non-positive intervals fall back to
    /// [`DEFAULT_POLL_INTERVAL_MS`].
    pub fn new(
        store: Arc<LoanStore>,
        members: Arc<dyn MemberDirectory>,
        catalog: Arc<dyn MediaCatalog>,
        email: Arc<dyn EmailSender>,
        metrics: Arc<AppMetrics>,
        poll_interval_ms: i64,
    ) -> Self {
        let poll_interval_ms = u64::try_from(poll_interval_ms)
            .ok()
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);

        Self {
            context: WatcherContext { store, members, catalog, email, metrics },
            poll_interval: Duration::from_millis(poll_interval_ms),
            running: None,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Whether a polling task is alive and has not been asked to stop.
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.task.is_finished() && !*r.stop_tx.borrow())
    }

    /// Spawn the polling task. No-op while already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_watcher(self.context.clone(), self.poll_interval, stop_rx));
        self.running = Some(RunningWatcher { stop_tx, task });
    }

    /// Ask the polling task to stop after its current tick. Idempotent.
    pub fn stop(&mut self) {
        if let Some(running) = &self.running {
            // receiver gone means the task already ended
            let _ = running.stop_tx.send(true);
        }
    }

    /// Stop and wait for the polling task to finish.
    pub async fn shutdown(&mut self) {
        self.stop();
        if let Some(running) = self.running.take() {
            if let Err(err) = running.task.await {
                tracing::error!("Testing-mode watcher task failed: {}", err);
            }
        }
    }

    /// Run a single tick against `now` without the background task.
    pub async fn poll_once(&self, now: DateTime<Utc>) -> PollReport {
        self.context.poll_once(now).await
    }
}

async fn run_watcher(context: WatcherContext, poll_interval: Duration, mut stop_rx: watch::Receiver<bool>) {
    let mut interval = time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!("Testing-mode watcher started (interval: {}ms)", poll_interval.as_millis());

    loop {
        if *stop_rx.borrow() {
            break;
        }

        tokio::select! {
            biased;

            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }

            _ = interval.tick() => {
                // Each tick runs as its own task so a panic inside it is
                // contained here and the loop carries on.
                let tick_context = context.clone();
                let tick = tokio::spawn(async move { tick_context.poll_once(Utc::now()).await });
                match tick.await {
                    Ok(report) if report.expired > 0 => {
                        tracing::debug!(
                            "Testing-mode tick: {} expired, {} evicted, {} skipped, {} failed",
                            report.expired,
                            report.evicted,
                            report.skipped,
                            report.failed
                        );
                    }
                    Ok(_) => {}
                    Err(err) => tracing::error!("Testing-mode watcher tick failed: {}", err),
                }
            }
        }
    }

    tracing::info!("Testing-mode watcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::alerts::mock::RecordingEmailSender;
    use crate::directory::{InMemoryCatalog, InMemoryMembers};
    use crate::loans::duration::TestingDuration;
    use crate::loans::service::LoanService;
    use crate::loans::types::{Loan, Media, Member, TestingWindow};

    const ADA: &str = "ada@example.com";
    const BOB: &str = "bob@example.com";
    const CY: &str = "cy@example.com";

    struct Fixture {
        store: Arc<LoanStore>,
        sender: Arc<RecordingEmailSender>,
        metrics: Arc<AppMetrics>,
        members: Arc<InMemoryMembers>,
        catalog: Arc<InMemoryCatalog>,
    }

    fn fixture() -> Fixture {
        Fixture {
            store: Arc::new(LoanStore::new()),
            sender: Arc::new(RecordingEmailSender::new()),
            metrics: Arc::new(AppMetrics::new().unwrap()),
            members: Arc::new(InMemoryMembers::with_members([
                Member::new(ADA, "Ada"),
                Member::new(BOB, "Bob"),
                Member::new(CY, "Cy"),
            ])),
            catalog: Arc::new(InMemoryCatalog::with_items([Media::book("b1", "Dune")])),
        }
    }

    fn watcher(f: &Fixture, poll_interval_ms: i64) -> TestingModeWatcher {
        TestingModeWatcher::new(
            f.store.clone(),
            f.members.clone(),
            f.catalog.clone(),
            f.sender.clone(),
            f.metrics.clone(),
            poll_interval_ms,
        )
    }

    fn testing_loan(media_id: &str, member_id: &str, seconds: u64, started: DateTime<Utc>) -> Loan {
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        Loan::new(&Media::book(media_id, "t"), member_id, today)
            .with_testing_window(TestingWindow::with_deadline(seconds, started))
    }

    #[test]
    fn non_positive_interval_falls_back_to_default() {
        let f = fixture();
        assert_eq!(watcher(&f, 0).poll_interval(), Duration::from_millis(5_000));
        assert_eq!(watcher(&f, -10).poll_interval(), Duration::from_millis(5_000));
        assert_eq!(watcher(&f, 50).poll_interval(), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn poll_notifies_and_removes_expired_loan() {
        let f = fixture();
        let start = Utc::now();
        f.store.save(testing_loan("b1", ADA, 1, start)).await;
        f.store.save(testing_loan("b2", ADA, 3600, start)).await;

        let report = watcher(&f, 50).poll_once(start + chrono::Duration::seconds(2)).await;

        assert_eq!(report, PollReport { expired: 1, evicted: 1, skipped: 0, failed: 0 });
        let sent = f.sender.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, ADA);
        assert_eq!(sent[0].subject, TESTING_SUBJECT);
        assert!(sent[0].body.contains("b1"));

        let remaining = f.store.find_all().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].media_id(), "b2");
    }

    #[tokio::test]
    async fn evicted_item_can_be_borrowed_again() {
        let f = fixture();
        let service = LoanService::new(f.store.clone(), f.members.clone(), f.catalog.clone());
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let start = Utc::now();
        let duration = TestingDuration::from_seconds(1).unwrap();
        service.borrow_for_testing(ADA, "b1", today, duration, start).await.unwrap();
        assert!(f.catalog.find_media("b1").await.unwrap().is_borrowed());

        let report = watcher(&f, 50).poll_once(start + chrono::Duration::seconds(2)).await;

        assert_eq!(report.evicted, 1);
        assert!(!f.catalog.find_media("b1").await.unwrap().is_borrowed());
        assert!(service.return_media(ADA, "b1", today).await.unwrap().is_none());
        let again = service.borrow(BOB, "b1", today).await.unwrap();
        assert_eq!(again.member_id(), BOB);
    }

    #[tokio::test]
    async fn expired_loans_are_handled_in_insertion_order() {
        let f = fixture();
        let start = Utc::now();
        f.store.save(testing_loan("b3", CY, 1, start)).await;
        f.store.save(testing_loan("b1", ADA, 1, start)).await;
        f.store.save(testing_loan("b2", BOB, 1, start)).await;

        watcher(&f, 50).poll_once(start + chrono::Duration::seconds(2)).await;

        let recipients: Vec<_> = f.sender.sent().await.into_iter().map(|m| m.to).collect();
        assert_eq!(recipients, vec![CY, ADA, BOB]);
        assert!(f.store.is_empty().await);
    }

    #[tokio::test]
    async fn loan_returned_during_notice_keeps_its_history() {
        let f = fixture();
        let start = Utc::now();
        let loan = f.store.save(testing_loan("b1", ADA, 1, start)).await;
        f.sender.hold_next();

        let w = Arc::new(watcher(&f, 50));
        let tick = {
            let w = w.clone();
            tokio::spawn(async move { w.poll_once(start + chrono::Duration::seconds(2)).await })
        };
        f.sender.wait_until_held().await;
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(f.store.settle_return(loan.id(), today).await.is_some());
        f.sender.release();

        let report = tick.await.unwrap();
        assert_eq!(report.evicted, 0);
        let stored = f.store.get(loan.id()).await.unwrap();
        assert!(stored.is_returned());
        assert!((f.metrics.testing_loans_expired_total.get()).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn unresolved_member_is_skipped_silently() {
        let f = fixture();
        let start = Utc::now();
        f.store.save(testing_loan("b1", "ghost@example.com", 1, start)).await;

        let report = watcher(&f, 50).poll_once(start + chrono::Duration::seconds(2)).await;

        assert_eq!(report.skipped, 1);
        assert_eq!(f.sender.attempts(), 0);
        assert_eq!(f.store.len().await, 1);
    }

    #[tokio::test]
    async fn failed_email_keeps_loan_for_retry() {
        let f = fixture();
        let start = Utc::now();
        f.store.save(testing_loan("b1", ADA, 1, start)).await;
        f.sender.fail_next(1);
        let w = watcher(&f, 50);
        let later = start + chrono::Duration::seconds(2);

        assert_eq!(w.poll_once(later).await.failed, 1);
        assert_eq!(f.store.len().await, 1);

        assert_eq!(w.poll_once(later).await.evicted, 1);
        assert!(f.store.is_empty().await);
        assert_eq!(f.sender.sent_count().await, 1);
    }

    #[tokio::test]
    async fn returned_testing_loan_is_ignored() {
        let f = fixture();
        let start = Utc::now();
        let loan = f.store.save(testing_loan("b1", ADA, 1, start)).await;
        f.store.mark_returned(loan.id()).await;

        let report = watcher(&f, 50).poll_once(start + chrono::Duration::seconds(5)).await;
        assert_eq!(report.expired, 0);
        assert_eq!(f.store.len().await, 1);
    }

    #[tokio::test]
    async fn running_watcher_evicts_within_two_seconds() {
        let f = fixture();
        f.store.save(testing_loan("b1", ADA, 1, Utc::now())).await;
        let mut w = watcher(&f, 50);
        w.start();

        let mut removed = false;
        for _ in 0..30 {
            if f.store.find_testing_mode().await.is_empty() {
                removed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        w.shutdown().await;

        assert!(removed, "expired testing loan should be evicted");
        let sent = f.sender.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, ADA);
        assert!((f.metrics.testing_loans_expired_total.get() - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let f = fixture();
        let mut w = watcher(&f, 50);

        w.stop();
        assert!(!w.is_running());

        w.start();
        w.start();
        assert!(w.is_running());

        w.stop();
        w.stop();
        assert!(!w.is_running());

        w.shutdown().await;
        assert!(!w.is_running());

        w.start();
        assert!(w.is_running());
        w.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_ends_the_task() {
        let f = fixture();
        let mut w = watcher(&f, 10_000);
        w.start();
        tokio::time::timeout(Duration::from_secs(1), w.shutdown())
            .await
            .expect("watcher should stop promptly");
    }
}
