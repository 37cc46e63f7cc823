//! Borrowing eligibility rules

use chrono::NaiveDate;

use crate::loans::error::LoanError;
use crate::loans::types::Member;
use crate::store::LoanStore;

/// Gate applied before every borrow: no unpaid fines and no overdue loans.
#[derive(Debug, Clone, Copy, Default)]
pub struct BorrowingRules;

impl BorrowingRules {
    pub fn new() -> Self {
        Self
    }

    pub async fn ensure_can_borrow(
        &self,
        member: &Member,
        store: &LoanStore,
        today: NaiveDate,
    ) -> Result<(), LoanError> {
        if !member.can_borrow() {
            return Err(LoanError::not_eligible("member has unpaid fines"));
        }
        if !store.find_active_overdue_by_member(&member.id, today).await.is_empty() {
            return Err(LoanError::not_eligible("member has overdue loans"));
        }
        Ok(())
    }

    pub async fn can_borrow(&self, member: &Member, store: &LoanStore, today: NaiveDate) -> bool {
        self.ensure_can_borrow(member, store, today).await.is_ok()
    }
}
