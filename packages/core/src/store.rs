//! In-memory loan store.
//!
//! `LoanStore` is the single authoritative index of every loan created in
//! the process, kept in insertion order. All state sits behind one
//! `tokio::sync::RwLock`; every operation is one critical section and every
//! read hands back cloned snapshots, so the overdue scan and the testing
//! watcher can iterate while foreground borrows and returns keep mutating.
//!
//! There is no cross-call transaction. "Check for an active loan, then
//! save a new one" is two calls and callers own that race.
//!
//! Share it as `Arc<LoanStore>`.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use crate::loans::fine::calculate_fine;
use crate::loans::types::{Loan, LoanId};

#[derive(Debug, Default)]
struct StoreState {
    loans: Vec<Loan>,
    last_id: u64,
    /// Loans whose overdue notification is being delivered right now.
    notifying: HashSet<LoanId>,
}

impl StoreState {
    fn get_mut(&mut self, id: LoanId) -> Option<&mut Loan> {
        self.loans.iter_mut().find(|l| l.id() == id)
    }
}

/// Thread-safe, insertion-ordered store of `Loan` values.
#[derive(Debug, Default)]
pub struct LoanStore {
    state: RwLock<StoreState>,
}

impl LoanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a loan, assigning it a fresh id. Returns the stored copy.
    ///
    /// No uniqueness check: callers make sure the media has no active loan.
    pub async fn save(&self, mut loan: Loan) -> Loan {
        let mut state = self.state.write().await;
        state.last_id += 1;
        loan.assign_id(LoanId(state.last_id));
        state.loans.push(loan.clone());
        loan
    }

    pub async fn get(&self, id: LoanId) -> Option<Loan> {
        self.state.read().await.loans.iter().find(|l| l.id() == id).cloned()
    }

    /// Every loan, returned or not, oldest first.
    pub async fn find_all(&self) -> Vec<Loan> {
        self.state.read().await.loans.clone()
    }

    pub async fn find_all_active(&self) -> Vec<Loan> {
        self.filtered(|l| l.is_active()).await
    }

    pub async fn find_active_by_media(&self, media_id: &str) -> Option<Loan> {
        self.state
            .read()
            .await
            .loans
            .iter()
            .find(|l| l.is_active() && l.media_id() == media_id)
            .cloned()
    }

    pub async fn find_active_by_member(&self, member_id: &str) -> Vec<Loan> {
        self.filtered(|l| l.is_active() && l.member_id() == member_id).await
    }

    pub async fn find_active_by_member_and_media(&self, member_id: &str, media_id: &str) -> Option<Loan> {
        self.state
            .read()
            .await
            .loans
            .iter()
            .find(|l| l.is_active() && l.member_id() == member_id && l.media_id() == media_id)
            .cloned()
    }

    /// Active overdue loans of one member. A blank id yields an empty list.
    pub async fn find_active_overdue_by_member(&self, member_id: &str, as_of: NaiveDate) -> Vec<Loan> {
        if member_id.trim().is_empty() {
            return Vec::new();
        }
        self.filtered(|l| l.member_id() == member_id && l.is_overdue(as_of)).await
    }

    pub async fn find_all_active_overdue(&self, as_of: NaiveDate) -> Vec<Loan> {
        self.filtered(|l| l.is_overdue(as_of)).await
    }

    /// Active loans carrying a testing-mode window.
    pub async fn find_testing_mode(&self) -> Vec<Loan> {
        self.filtered(|l| l.is_active() && l.is_testing_mode()).await
    }

    /// Active testing-mode loans whose wall-clock window has run out.
    pub async fn find_expired_testing(&self, now: DateTime<Utc>) -> Vec<Loan> {
        self.filtered(|l| l.is_testing_expired(now)).await
    }

    /// Mark a loan returned. `false` when unknown or already returned.
    pub async fn mark_returned(&self, id: LoanId) -> bool {
        let mut state = self.state.write().await;
        match state.get_mut(id) {
            Some(loan) if loan.is_active() => {
                loan.mark_returned();
                true
            }
            _ => false,
        }
    }

    /// Settle a return in one step: fix the fine as of `return_date`, then
    /// mark the loan returned. `None` when unknown or already returned.
    pub async fn settle_return(&self, id: LoanId, return_date: NaiveDate) -> Option<Loan> {
        let mut state = self.state.write().await;
        let loan = state.get_mut(id).filter(|l| l.is_active())?;
        calculate_fine(loan, return_date);
        loan.mark_returned();
        Some(loan.clone())
    }

    /// Recompute the stored fine as of `as_of`.
    pub async fn update_fine(&self, id: LoanId, as_of: NaiveDate) -> Option<f64> {
        let mut state = self.state.write().await;
        state.get_mut(id).map(|loan| calculate_fine(loan, as_of))
    }

    /// Claim the right to deliver the overdue notification for `id`.
    ///
    /// Succeeds only for an active, not-yet-notified loan that no other
    /// pass is currently notifying. A successful claim must be followed by
    /// [`complete_overdue_notification`](Self::complete_overdue_notification)
    /// or [`abandon_overdue_notification`](Self::abandon_overdue_notification).
    pub async fn begin_overdue_notification(&self, id: LoanId) -> bool {
        let mut state = self.state.write().await;
        if state.notifying.contains(&id) {
            return false;
        }
        let claimable = state
            .loans
            .iter()
            .any(|l| l.id() == id && l.is_active() && !l.overdue_notification_sent());
        if claimable {
            state.notifying.insert(id);
        }
        claimable
    }

    /// Record a delivered notification. Terminal: the loan is never notified again.
    pub async fn complete_overdue_notification(&self, id: LoanId) {
        let mut state = self.state.write().await;
        state.notifying.remove(&id);
        if let Some(loan) = state.get_mut(id) {
            loan.mark_overdue_notification_sent();
        }
    }

    /// Release a claim after a failed delivery so a later scan retries.
    pub async fn abandon_overdue_notification(&self, id: LoanId) {
        self.state.write().await.notifying.remove(&id);
    }

    /// Drop an active loan entirely, leaving no history behind. A loan
    /// returned in the meantime is kept.
    pub async fn remove_active(&self, id: LoanId) -> Option<Loan> {
        let mut state = self.state.write().await;
        let index = state.loans.iter().position(|l| l.id() == id && l.is_active())?;
        state.notifying.remove(&id);
        Some(state.loans.remove(index))
    }

    /// Remove every loan. Ids keep counting up.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.loans.clear();
        state.notifying.clear();
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.loans.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.loans.is_empty()
    }

    async fn filtered(&self, keep: impl Fn(&Loan) -> bool) -> Vec<Loan> {
        self.state
            .read()
            .await
            .loans
            .iter()
            .filter(|l| keep(l))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Duration;

    use crate::loans::types::{Media, TestingWindow};

    fn day(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(n)
    }

    fn book_loan(media_id: &str, member_id: &str) -> Loan {
        Loan::new(&Media::book(media_id, "title"), member_id, day(0))
    }

    // ---- save / ids ----

    #[tokio::test]
    async fn save_assigns_increasing_ids() {
        let store = LoanStore::new();
        let a = store.save(book_loan("b1", "m1")).await;
        let b = store.save(book_loan("b2", "m1")).await;

        assert_eq!(a.id(), LoanId(1));
        assert_eq!(b.id(), LoanId(2));
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn find_all_preserves_insertion_order() {
        let store = LoanStore::new();
        for media in ["b1", "b2", "b3"] {
            store.save(book_loan(media, "m1")).await;
        }
        let ids: Vec<_> = store.find_all().await.iter().map(|l| l.media_id().to_string()).collect();
        assert_eq!(ids, vec!["b1", "b2", "b3"]);
    }

    #[tokio::test]
    async fn new_store_is_empty() {
        let store = LoanStore::new();
        assert!(store.is_empty().await);
        assert!(store.find_all_active().await.is_empty());
    }

    // ---- active queries ----

    #[tokio::test]
    async fn returned_loans_drop_out_of_active_queries() {
        let store = LoanStore::new();
        let loan = store.save(book_loan("b1", "m1")).await;

        assert!(store.mark_returned(loan.id()).await);

        assert!(store.find_active_by_media("b1").await.is_none());
        assert!(store.find_active_by_member("m1").await.is_empty());
        assert!(store.find_all_active_overdue(day(100)).await.is_empty());
        assert_eq!(store.find_all().await.len(), 1);
    }

    #[tokio::test]
    async fn mark_returned_is_one_directional() {
        let store = LoanStore::new();
        let loan = store.save(book_loan("b1", "m1")).await;

        assert!(store.mark_returned(loan.id()).await);
        assert!(!store.mark_returned(loan.id()).await);
        assert!(store.get(loan.id()).await.unwrap().is_returned());
    }

    #[tokio::test]
    async fn find_active_by_member_filters_member() {
        let store = LoanStore::new();
        store.save(book_loan("b1", "m1")).await;
        store.save(book_loan("b2", "m2")).await;
        store.save(book_loan("b3", "m1")).await;

        assert_eq!(store.find_active_by_member("m1").await.len(), 2);
        assert!(store.find_active_by_member_and_media("m2", "b2").await.is_some());
        assert!(store.find_active_by_member_and_media("m1", "b2").await.is_none());
    }

    #[tokio::test]
    async fn overdue_by_member_with_blank_id_is_empty() {
        let store = LoanStore::new();
        store.save(book_loan("b1", "")).await;

        assert!(store.find_active_overdue_by_member("", day(100)).await.is_empty());
        assert!(store.find_active_overdue_by_member("   ", day(100)).await.is_empty());
    }

    #[tokio::test]
    async fn overdue_queries_respect_boundary() {
        let store = LoanStore::new();
        store.save(book_loan("b1", "m1")).await;

        assert!(store.find_all_active_overdue(day(28)).await.is_empty());
        assert_eq!(store.find_all_active_overdue(day(29)).await.len(), 1);
        assert_eq!(store.find_active_overdue_by_member("m1", day(29)).await.len(), 1);
    }

    // ---- snapshots ----

    #[tokio::test]
    async fn snapshots_are_independent_of_later_mutation() {
        let store = LoanStore::new();
        let loan = store.save(book_loan("b1", "m1")).await;
        let snapshot = store.find_all_active().await;

        store.mark_returned(loan.id()).await;
        store.save(book_loan("b2", "m1")).await;

        assert_eq!(snapshot.len(), 1);
        assert!(!snapshot[0].is_returned());
    }

    // ---- fines / returns ----

    #[tokio::test]
    async fn update_fine_recomputes_in_place() {
        let store = LoanStore::new();
        let loan = store.save(book_loan("b1", "m1")).await;

        assert_eq!(store.update_fine(loan.id(), day(35)).await, Some(70.0));
        assert_eq!(store.get(loan.id()).await.unwrap().fine_amount(), 70.0);
        assert_eq!(store.update_fine(LoanId(99), day(35)).await, None);
    }

    #[tokio::test]
    async fn settle_return_fixes_fine_before_marking_returned() {
        let store = LoanStore::new();
        let loan = store.save(book_loan("b1", "m1")).await;

        let settled = store.settle_return(loan.id(), day(30)).await.unwrap();
        assert!(settled.is_returned());
        assert_eq!(settled.fine_amount(), 20.0);
        assert!(store.settle_return(loan.id(), day(31)).await.is_none());
    }

    // ---- notification claims ----

    #[tokio::test]
    async fn notification_claim_is_exclusive_until_released() {
        let store = LoanStore::new();
        let loan = store.save(book_loan("b1", "m1")).await;

        assert!(store.begin_overdue_notification(loan.id()).await);
        assert!(!store.begin_overdue_notification(loan.id()).await);

        store.abandon_overdue_notification(loan.id()).await;
        assert!(store.begin_overdue_notification(loan.id()).await);
    }

    #[tokio::test]
    async fn completed_notification_cannot_be_claimed_again() {
        let store = LoanStore::new();
        let loan = store.save(book_loan("b1", "m1")).await;

        assert!(store.begin_overdue_notification(loan.id()).await);
        store.complete_overdue_notification(loan.id()).await;

        assert!(store.get(loan.id()).await.unwrap().overdue_notification_sent());
        assert!(!store.begin_overdue_notification(loan.id()).await);
    }

    #[tokio::test]
    async fn returned_loan_cannot_be_claimed() {
        let store = LoanStore::new();
        let loan = store.save(book_loan("b1", "m1")).await;
        store.mark_returned(loan.id()).await;

        assert!(!store.begin_overdue_notification(loan.id()).await);
    }

    // ---- testing mode ----

    #[tokio::test]
    async fn expired_testing_loans_are_found_by_wall_clock() {
        let store = LoanStore::new();
        let now = Utc::now();
        store
            .save(book_loan("b1", "m1").with_testing_window(TestingWindow::with_deadline(1, now)))
            .await;
        store
            .save(book_loan("b2", "m1").with_testing_window(TestingWindow::with_deadline(3600, now)))
            .await;
        store.save(book_loan("b3", "m1")).await;

        assert_eq!(store.find_testing_mode().await.len(), 2);
        let expired = store.find_expired_testing(now + Duration::seconds(2)).await;
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].media_id(), "b1");
    }

    // ---- remove / clear ----

    #[tokio::test]
    async fn remove_drops_loan_entirely() {
        let store = LoanStore::new();
        let loan = store.save(book_loan("b1", "m1")).await;

        assert!(store.remove_active(loan.id()).await.is_some());
        assert!(store.remove_active(loan.id()).await.is_none());
        assert!(store.find_all().await.is_empty());
    }

    #[tokio::test]
    async fn remove_active_keeps_returned_loans() {
        let store = LoanStore::new();
        let returned = store.save(book_loan("b1", "m1")).await;
        let active = store.save(book_loan("b2", "m1")).await;
        store.mark_returned(returned.id()).await;

        assert!(store.remove_active(returned.id()).await.is_none());
        assert_eq!(store.remove_active(active.id()).await.map(|l| l.id()), Some(active.id()));

        let left: Vec<_> = store.find_all().await.iter().map(|l| l.id()).collect();
        assert_eq!(left, vec![returned.id()]);
    }

    #[tokio::test]
    async fn clear_empties_store_but_ids_keep_counting() {
        let store = LoanStore::new();
        store.save(book_loan("b1", "m1")).await;
        store.clear().await;
        assert!(store.is_empty().await);

        let next = store.save(book_loan("b2", "m1")).await;
        assert_eq!(next.id(), LoanId(2));
    }

    #[tokio::test]
    async fn concurrent_saves_from_many_tasks_are_all_kept() {
        let store = Arc::new(LoanStore::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.save(book_loan(&format!("b{}", i), "m1")).await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut ids: Vec<_> = store.find_all().await.iter().map(|l| l.id().0).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 32);
    }
}
