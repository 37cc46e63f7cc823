//! Foreground loan operations.
//!
//! Borrow and return run on the caller's task and mutate the same
//! [`LoanStore`] the background passes read. Each store call is atomic on
//! its own; the "no active loan on this media" check followed by the save
//! is not, which is acceptable with a single operator at the desk.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use crate::directory::{MediaCatalog, MemberDirectory};
use crate::loans::{
    duration::TestingDuration,
    error::{require_identifier, LoanError},
    policy::due_date_after,
    rules::BorrowingRules,
    types::{Loan, LoanId, Media, Member, TestingWindow},
};
use crate::store::LoanStore;

pub struct LoanService {
    store: Arc<LoanStore>,
    members: Arc<dyn MemberDirectory>,
    catalog: Arc<dyn MediaCatalog>,
    rules: BorrowingRules,
}

impl LoanService {
    pub fn new(
        store: Arc<LoanStore>,
        members: Arc<dyn MemberDirectory>,
        catalog: Arc<dyn MediaCatalog>,
    ) -> Self {
        Self {
            store,
            members,
            catalog,
            rules: BorrowingRules::new(),
        }
    }

    pub fn store(&self) -> &Arc<LoanStore> {
        &self.store
    }

    /// Borrow `media_id` for the media's standard period.
    pub async fn borrow(
        &self,
        member_id: &str,
        media_id: &str,
        borrow_date: NaiveDate,
    ) -> Result<Loan, LoanError> {
        let (member, media) = self.prepare_borrow(member_id, media_id, borrow_date).await?;
        self.commit_borrow(Loan::try_new(&media, &member.id, borrow_date)?).await
    }

    /// Borrow for a custom number of days; `0` means the standard period.
    pub async fn borrow_for_days(
        &self,
        member_id: &str,
        media_id: &str,
        borrow_date: NaiveDate,
        days: u32,
    ) -> Result<Loan, LoanError> {
        if days == 0 {
            return self.borrow(member_id, media_id, borrow_date).await;
        }
        let due_date = due_date_after(borrow_date, u64::from(days)).ok_or_else(|| {
            LoanError::invalid_argument(format!("{} days from {} is past the end of the calendar", days, borrow_date))
        })?;
        let (member, media) = self.prepare_borrow(member_id, media_id, borrow_date).await?;
        let loan = Loan::with_due_date(media.id.clone(), member.id.clone(), borrow_date, due_date)
            .with_media_kind(media.kind);
        self.commit_borrow(loan).await
    }

    /// Borrow with a short wall-clock lifetime, expired by the testing-mode watcher.
    ///
    /// The calendar due date spans the duration rounded up to whole days;
    /// the watcher ignores it and uses the deadline `now + duration`.
    pub async fn borrow_for_testing(
        &self,
        member_id: &str,
        media_id: &str,
        borrow_date: NaiveDate,
        duration: TestingDuration,
        now: DateTime<Utc>,
    ) -> Result<Loan, LoanError> {
        let due_date = due_date_after(borrow_date, duration.calendar_days())
            .ok_or_else(|| LoanError::invalid_duration("testing duration is too large"))?;
        let (member, media) = self.prepare_borrow(member_id, media_id, borrow_date).await?;
        let window = TestingWindow::with_deadline(duration.total_seconds(), now);
        let loan = Loan::with_due_date(media.id.clone(), member.id.clone(), borrow_date, due_date)
            .with_media_kind(media.kind)
            .with_testing_window(window);

        let loan = self.commit_borrow(loan).await?;
        tracing::info!(
            "[TESTING MODE] {} expires at {:?} ({}s)",
            loan.id(),
            loan.testing_window().and_then(|w| w.expires_at),
            duration.total_seconds()
        );
        Ok(loan)
    }

    /// Return the member's active loan on `media_id`.
    ///
    /// `Ok(None)` when no such loan is active.
    pub async fn return_media(
        &self,
        member_id: &str,
        media_id: &str,
        return_date: NaiveDate,
    ) -> Result<Option<Loan>, LoanError> {
        require_identifier(member_id, "member id")?;
        require_identifier(media_id, "media id")?;

        match self.store.find_active_by_member_and_media(member_id, media_id).await {
            Some(loan) => Ok(self.settle(loan.id(), return_date).await),
            None => {
                tracing::info!("No active loan for media {} and member {}", media_id, member_id);
                Ok(None)
            }
        }
    }

    /// Return by loan id. Already-returned or unknown loans are a no-op.
    pub async fn return_loan(&self, id: LoanId, return_date: NaiveDate) -> Option<Loan> {
        self.settle(id, return_date).await
    }

    pub async fn active_loans(&self) -> Vec<Loan> {
        self.store.find_all_active().await
    }

    pub async fn all_loans(&self) -> Vec<Loan> {
        self.store.find_all().await
    }

    pub async fn overdue_loans(&self, as_of: NaiveDate) -> Vec<Loan> {
        self.store.find_all_active_overdue(as_of).await
    }

    pub async fn testing_loans(&self) -> Vec<Loan> {
        self.store.find_testing_mode().await
    }

    pub async fn overdue_loans_for_member(&self, member_id: &str, as_of: NaiveDate) -> Vec<Loan> {
        self.store.find_active_overdue_by_member(member_id, as_of).await
    }

    pub async fn has_active_loans(&self, member_id: &str) -> bool {
        if member_id.trim().is_empty() {
            return false;
        }
        !self.store.find_active_by_member(member_id).await.is_empty()
    }

    pub async fn count_active_loans(&self) -> usize {
        self.store.find_all_active().await.len()
    }

    /// Most recently borrowed loans first.
    pub async fn latest_loans(&self, limit: usize) -> Vec<Loan> {
        let mut loans = self.store.find_all().await;
        loans.sort_by(|a, b| b.borrow_date().cmp(&a.borrow_date()));
        loans.truncate(limit);
        loans
    }

    /// Fines currently accruing on the member's active loans as of `as_of`.
    ///
    /// Each loan's stored fine is recomputed on the way.
    pub async fn total_fines_for_member(&self, member_id: &str, as_of: NaiveDate) -> f64 {
        let mut total = 0.0;
        for loan in self.store.find_active_by_member(member_id).await {
            total += self.store.update_fine(loan.id(), as_of).await.unwrap_or(0.0);
        }
        total
    }

    async fn prepare_borrow(
        &self,
        member_id: &str,
        media_id: &str,
        borrow_date: NaiveDate,
    ) -> Result<(Member, Media), LoanError> {
        require_identifier(member_id, "member id")?;
        require_identifier(media_id, "media id")?;

        let member = self
            .members
            .find_member(member_id)
            .await
            .ok_or_else(|| LoanError::member_not_found(member_id))?;
        self.rules.ensure_can_borrow(&member, &self.store, borrow_date).await?;

        let media = self
            .catalog
            .find_media(media_id)
            .await
            .ok_or_else(|| LoanError::media_not_found(media_id))?;
        if media.is_borrowed() || self.store.find_active_by_media(media_id).await.is_some() {
            return Err(LoanError::already_borrowed(media_id));
        }

        Ok((member, media))
    }

    async fn commit_borrow(&self, loan: Loan) -> Result<Loan, LoanError> {
        let loan = self.store.save(loan).await;
        if !self.catalog.mark_borrowed(loan.media_id(), loan.due_date()).await {
            tracing::warn!("Media {} vanished from the catalog during borrow", loan.media_id());
        }
        tracing::info!(
            "Media {} borrowed by {} (due {})",
            loan.media_id(),
            loan.member_id(),
            loan.due_date()
        );
        Ok(loan)
    }

    async fn settle(&self, id: LoanId, return_date: NaiveDate) -> Option<Loan> {
        let Some(loan) = self.store.settle_return(id, return_date).await else {
            tracing::info!("{} is not an active loan; nothing to return", id);
            return None;
        };

        self.catalog.mark_available(loan.media_id()).await;

        let fine = loan.fine_amount();
        if fine > 0.0 {
            if self.members.add_fine(loan.member_id(), fine).await {
                tracing::info!("Media {} returned late; fine {:.2} added to {}", loan.media_id(), fine, loan.member_id());
            } else {
                tracing::warn!("Fine {:.2} for {} not recorded: member {} not found", fine, id, loan.member_id());
            }
        }

        tracing::info!("Media {} returned", loan.media_id());
        Some(loan)
    }
}
