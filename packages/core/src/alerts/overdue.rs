//! Overdue-loan notification.
//!
//! The scanner hands each newly overdue loan to an [`OverdueNotifier`] as
//! a typed [`OverdueLoan`] and waits for the result. A returned error means
//! "not delivered" and leaves the loan eligible for the next scan.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use crate::alerts::email::{EmailError, EmailSender};
use crate::loans::types::{Loan, LoanId, MediaKind};

pub const OVERDUE_SUBJECT: &str = "Library: Media Overdue";

/// Payload describing one loan that has just become overdue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverdueLoan {
    pub loan_id: LoanId,
    pub member_id: String,
    pub media_id: String,
    pub media_kind: Option<MediaKind>,
    pub due_date: NaiveDate,
    pub as_of: NaiveDate,
    pub days_overdue: i64,
    /// Fine as computed during the scan that produced this event.
    pub fine_amount: f64,
}

impl OverdueLoan {
    pub fn new(loan: &Loan, as_of: NaiveDate, fine_amount: f64) -> Self {
        Self {
            loan_id: loan.id(),
            member_id: loan.member_id().to_string(),
            media_id: loan.media_id().to_string(),
            media_kind: loan.media_kind(),
            due_date: loan.due_date(),
            as_of,
            days_overdue: loan.days_overdue(as_of),
            fine_amount,
        }
    }
}

/// Receiver of overdue-loan events.
#[async_trait]
pub trait OverdueNotifier: Send + Sync {
    async fn notify_overdue(&self, event: &OverdueLoan) -> Result<(), EmailError>;
}

/// Emails the member (whose id is their address) about the overdue loan.
#[derive(Clone)]
pub struct OverdueEmailNotifier {
    email: Arc<dyn EmailSender>,
}

impl OverdueEmailNotifier {
    pub fn new(email: Arc<dyn EmailSender>) -> Self {
        Self { email }
    }

    pub fn render_body(event: &OverdueLoan) -> String {
        format!(
            "Overdue notice for {member}: your loan for media {media} was due on {due} \
             and is {days} day(s) overdue. Current fine: {fine:.2}",
            member = event.member_id,
            media = event.media_id,
            due = event.due_date,
            days = event.days_overdue,
            fine = event.fine_amount,
        )
    }
}

#[async_trait]
impl OverdueNotifier for OverdueEmailNotifier {
    async fn notify_overdue(&self, event: &OverdueLoan) -> Result<(), EmailError> {
        let body = Self::render_body(event);
        self.email.send(&event.member_id, OVERDUE_SUBJECT, &body).await
    }
}
