//! Overdue scanner.
//!
//! Each active loan is conceptually `Current`, `OverdueUnnotified` or
//! `OverdueNotified`. A scan pass moves loans from unnotified to notified
//! by delivering exactly one notification per loan:
//!
//! 1. Snapshot all active loans (insertion order).
//! 2. Skip loans that are current or already notified.
//! 3. Claim the loan in the store, recompute its fine, notify.
//! 4. On success mark it notified for good; on failure release the claim
//!    so the next pass retries.
//!
//! One loan's failure never aborts the rest of the pass. The claim keeps
//! two overlapping passes from notifying the same loan twice.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::alerts::overdue::{OverdueLoan, OverdueNotifier};
use crate::metrics::AppMetrics;
use crate::store::LoanStore;

/// Outcome of one scan pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Active loans looked at.
    pub examined: usize,
    /// Loans newly notified in this pass.
    pub notified: usize,
    /// Overdue loans skipped because they were already notified (or claimed
    /// by a concurrent pass).
    pub already_notified: usize,
    /// Overdue loans whose notification failed; retried next pass.
    pub failed: usize,
}

pub struct OverdueScanner {
    store: Arc<LoanStore>,
    notifier: Arc<dyn OverdueNotifier>,
    metrics: Arc<AppMetrics>,
}

impl OverdueScanner {
    pub fn new(
        store: Arc<LoanStore>,
        notifier: Arc<dyn OverdueNotifier>,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self { store, notifier, metrics }
    }

    /// Run one scan pass as of `as_of`.
    pub async fn scan(&self, as_of: NaiveDate) -> ScanReport {
        let active = self.store.find_all_active().await;
        self.metrics.scans_total.inc();
        self.metrics.active_loans.set(active.len() as f64);

        let mut report = ScanReport {
            examined: active.len(),
            ..ScanReport::default()
        };

        for loan in active.iter().filter(|l| l.is_overdue(as_of)) {
            if loan.overdue_notification_sent() || !self.store.begin_overdue_notification(loan.id()).await {
                report.already_notified += 1;
                continue;
            }

            let Some(fine) = self.store.update_fine(loan.id(), as_of).await else {
                // removed between snapshot and claim
                self.store.abandon_overdue_notification(loan.id()).await;
                continue;
            };

            let event = OverdueLoan::new(loan, as_of, fine);
            match self.notifier.notify_overdue(&event).await {
                Ok(()) => {
                    self.store.complete_overdue_notification(loan.id()).await;
                    self.metrics.overdue_notifications_total.inc();
                    report.notified += 1;
                    tracing::info!(
                        "Overdue notice sent for {} (media {}, member {}, fine {:.2})",
                        loan.id(),
                        loan.media_id(),
                        loan.member_id(),
                        fine
                    );
                }
                Err(err) => {
                    self.store.abandon_overdue_notification(loan.id()).await;
                    self.metrics.notification_failures_total.inc();
                    report.failed += 1;
                    tracing::warn!("Overdue notice for {} failed, will retry: {}", loan.id(), err);
                }
            }
        }

        tracing::debug!(
            "Scan as of {}: {} examined, {} notified, {} already notified, {} failed",
            as_of,
            report.examined,
            report.notified,
            report.already_notified,
            report.failed
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::alerts::mock::RecordingEmailSender;
    use crate::alerts::overdue::{OverdueEmailNotifier, OVERDUE_SUBJECT};
    use crate::loans::types::{Loan, Media};

    fn day(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(n)
    }

    struct Fixture {
        scanner: OverdueScanner,
        store: Arc<LoanStore>,
        sender: Arc<RecordingEmailSender>,
        metrics: Arc<AppMetrics>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(LoanStore::new());
        let sender = Arc::new(RecordingEmailSender::new());
        let metrics = Arc::new(AppMetrics::new().unwrap());
        let notifier = Arc::new(OverdueEmailNotifier::new(sender.clone()));
        let scanner = OverdueScanner::new(store.clone(), notifier, metrics.clone());
        Fixture { scanner, store, sender, metrics }
    }

    async fn save_book(store: &LoanStore, media_id: &str, member_id: &str) -> Loan {
        store
            .save(Loan::new(&Media::book(media_id, "t"), member_id, day(0)))
            .await
    }

    #[tokio::test]
    async fn current_loan_is_not_notified() {
        let f = fixture();
        save_book(&f.store, "b1", "ada@example.com").await;

        let report = f.scanner.scan(day(28)).await;

        assert_eq!(report.examined, 1);
        assert_eq!(report.notified, 0);
        assert_eq!(f.sender.sent_count().await, 0);
    }

    #[tokio::test]
    async fn overdue_loan_is_notified_with_computed_fine() {
        let f = fixture();
        let loan = save_book(&f.store, "b1", "ada@example.com").await;

        let report = f.scanner.scan(day(35)).await;
        assert_eq!(report.notified, 1);

        let sent = f.sender.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ada@example.com");
        assert_eq!(sent[0].subject, OVERDUE_SUBJECT);
        assert!(sent[0].body.contains("b1"));
        assert!(sent[0].body.contains("70.00"));

        let stored = f.store.get(loan.id()).await.unwrap();
        assert!(stored.overdue_notification_sent());
        assert_eq!(stored.fine_amount(), 70.0);
    }

    #[tokio::test]
    async fn repeated_scans_notify_at_most_once() {
        let f = fixture();
        let loan = save_book(&f.store, "b1", "ada@example.com").await;

        for offset in [29, 29, 35, 36, 60] {
            f.scanner.scan(day(offset)).await;
        }

        assert_eq!(f.sender.sent_count().await, 1);
        // growth stays visible to fine queries even though it is not re-announced
        assert_eq!(f.store.update_fine(loan.id(), day(36)).await, Some(80.0));
    }

    #[tokio::test]
    async fn failed_notification_is_retried_next_scan() {
        let f = fixture();
        let loan = save_book(&f.store, "b1", "ada@example.com").await;
        f.sender.fail_next(1);

        let first = f.scanner.scan(day(35)).await;
        assert_eq!(first.failed, 1);
        assert!(!f.store.get(loan.id()).await.unwrap().overdue_notification_sent());

        let second = f.scanner.scan(day(35)).await;
        assert_eq!(second.notified, 1);
        assert_eq!(f.sender.attempts(), 2);
        assert_eq!(f.sender.sent_count().await, 1);
        assert!((f.metrics.notification_failures_total.get() - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_pass() {
        let f = fixture();
        save_book(&f.store, "b1", "ada@example.com").await;
        save_book(&f.store, "b2", "bob@example.com").await;
        save_book(&f.store, "b3", "cy@example.com").await;
        f.sender.fail_next(1);

        let report = f.scanner.scan(day(30)).await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.notified, 2);
        let recipients: Vec<_> = f.sender.sent().await.into_iter().map(|m| m.to).collect();
        // insertion order, first one failed
        assert_eq!(recipients, vec!["bob@example.com", "cy@example.com"]);
    }

    #[tokio::test]
    async fn returned_loans_are_out_of_scope() {
        let f = fixture();
        let loan = save_book(&f.store, "b1", "ada@example.com").await;
        f.store.mark_returned(loan.id()).await;

        let report = f.scanner.scan(day(60)).await;
        assert_eq!(report.examined, 0);
        assert_eq!(f.sender.sent_count().await, 0);
    }

    #[tokio::test]
    async fn concurrent_scans_do_not_duplicate_notifications() {
        let f = fixture();
        for i in 0..20 {
            save_book(&f.store, &format!("b{}", i), "ada@example.com").await;
        }
        let scanner = Arc::new(f.scanner);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let scanner = scanner.clone();
            handles.push(tokio::spawn(async move { scanner.scan(day(40)).await }));
        }
        let mut notified = 0;
        for handle in handles {
            notified += handle.await.unwrap().notified;
        }

        assert_eq!(notified, 20);
        assert_eq!(f.sender.sent_count().await, 20);
    }

    #[tokio::test]
    async fn loan_returned_mid_scan_gets_no_notice() {
        let f = fixture();
        save_book(&f.store, "b1", "ada@example.com").await;
        let late = save_book(&f.store, "b2", "bob@example.com").await;
        f.sender.hold_next();

        let scanner = Arc::new(f.scanner);
        let scan = {
            let scanner = scanner.clone();
            tokio::spawn(async move { scanner.scan(day(40)).await })
        };
        // the first notice is in flight; the desk returns the second item
        f.sender.wait_until_held().await;
        assert!(f.store.settle_return(late.id(), day(40)).await.is_some());
        f.sender.release();

        let report = scan.await.unwrap();
        assert_eq!(report.examined, 2);
        assert_eq!(report.notified, 1);
        let sent = f.sender.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ada@example.com");

        let returned = f.store.get(late.id()).await.unwrap();
        assert!(returned.is_returned());
        assert!(!returned.overdue_notification_sent());
    }

    #[tokio::test]
    async fn scan_updates_metrics() {
        let f = fixture();
        save_book(&f.store, "b1", "ada@example.com").await;
        save_book(&f.store, "b2", "bob@example.com").await;

        f.scanner.scan(day(30)).await;

        assert!((f.metrics.scans_total.get() - 1.0).abs() < f64::EPSILON);
        assert!((f.metrics.active_loans.get() - 2.0).abs() < f64::EPSILON);
        assert!((f.metrics.overdue_notifications_total.get() - 2.0).abs() < f64::EPSILON);
    }
}
