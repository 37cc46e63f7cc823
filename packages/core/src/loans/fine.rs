//! Fine Calculator

use chrono::NaiveDate;

use crate::loans::{policy::LEGACY_FINE_PER_DAY, types::Loan};

/// Fine `loan` would carry as of `as_of`, without touching the loan.
pub fn preview_fine(loan: &Loan, as_of: NaiveDate) -> f64 {
    if !loan.is_overdue(as_of) {
        return 0.0;
    }
    let per_day = loan
        .media_kind()
        .map(|kind| kind.fine_per_day())
        .unwrap_or(LEGACY_FINE_PER_DAY);
    loan.days_overdue(as_of) as f64 * per_day
}

/// Recompute and store the fine on `loan` as of `as_of`.
///
/// Replaces the previous amount, so an earlier `as_of` can lower it.
pub fn calculate_fine(loan: &mut Loan, as_of: NaiveDate) -> f64 {
    let amount = preview_fine(loan, as_of);
    loan.set_fine_amount(amount);
    amount
}
