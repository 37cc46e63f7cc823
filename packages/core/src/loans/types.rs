//! Core data types for the circulation engine

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::loans::error::LoanError;

/// Store-assigned loan identifier. Zero means "not saved yet".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoanId(pub u64);

impl LoanId {
    pub const UNASSIGNED: LoanId = LoanId(0);

    pub fn is_assigned(self) -> bool {
        self != Self::UNASSIGNED
    }
}

impl fmt::Display for LoanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loan-{}", self.0)
    }
}

/// Borrowable media variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Book,
    Cd,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Book => write!(f, "book"),
            MediaKind::Cd => write!(f, "cd"),
        }
    }
}

/// A catalog item (book or compact disc).
///
/// `borrowed` and `due_date` move together: a borrowed item always has a
/// due date and an available one never does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    pub id: String,
    pub title: String,
    pub kind: MediaKind,
    borrowed: bool,
    due_date: Option<NaiveDate>,
}

impl Media {
    pub fn new(id: impl Into<String>, title: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind,
            borrowed: false,
            due_date: None,
        }
    }

    pub fn book(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self::new(id, title, MediaKind::Book)
    }

    pub fn cd(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self::new(id, title, MediaKind::Cd)
    }

    pub fn is_borrowed(&self) -> bool {
        self.borrowed
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    /// Mark borrowed on `borrow_date`, due after the kind's borrow period.
    ///
    /// Returns the due date, or `None` (and leaves the item untouched) when
    /// it would fall past the end of the calendar.
    pub fn borrow_at(&mut self, borrow_date: NaiveDate) -> Option<NaiveDate> {
        let due = self.kind.due_date(borrow_date)?;
        self.borrow_until(due);
        Some(due)
    }

    /// Mark borrowed with an explicit due date.
    pub fn borrow_until(&mut self, due_date: NaiveDate) {
        self.borrowed = true;
        self.due_date = Some(due_date);
    }

    pub fn mark_returned(&mut self) {
        self.borrowed = false;
        self.due_date = None;
    }
}

/// A library member. The identifier doubles as the member's email address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub name: String,
    fine_balance: f64,
}

impl Member {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            fine_balance: 0.0,
        }
    }

    pub fn fine_balance(&self) -> f64 {
        self.fine_balance
    }

    pub fn add_fine(&mut self, amount: f64) {
        self.fine_balance += amount;
    }

    /// Pay towards the balance. Overpayments are refused and leave it unchanged.
    pub fn pay_fine(&mut self, amount: f64) -> bool {
        if amount < 0.0 || amount > self.fine_balance {
            return false;
        }
        self.fine_balance -= amount;
        true
    }

    /// Only members with a cleared balance may borrow.
    pub fn can_borrow(&self) -> bool {
        self.fine_balance == 0.0
    }

    /// Address notifications are sent to, if there is a usable one.
    pub fn contact_address(&self) -> Option<&str> {
        let address = self.id.trim();
        (!address.is_empty()).then_some(address)
    }
}

/// Wall-clock lifetime of a testing-mode loan.
///
/// When `expires_at` is present it wins; otherwise expiry is derived from
/// `started_at + duration_seconds`. Independent of the calendar due date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestingWindow {
    pub duration_seconds: u64,
    pub started_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TestingWindow {
    /// Window with only start + duration; expiry is computed on demand.
    pub fn new(duration_seconds: u64, started_at: DateTime<Utc>) -> Self {
        Self {
            duration_seconds,
            started_at,
            expires_at: None,
        }
    }

    /// Window with an explicit deadline of `started_at + duration_seconds`.
    pub fn with_deadline(duration_seconds: u64, started_at: DateTime<Utc>) -> Self {
        let seconds = i64::try_from(duration_seconds).unwrap_or(i64::MAX);
        let expires_at = Duration::try_seconds(seconds)
            .and_then(|d| started_at.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            duration_seconds,
            started_at,
            expires_at: Some(expires_at),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(deadline) => now > deadline,
            None => {
                let elapsed = (now - self.started_at).num_seconds();
                self.duration_seconds > 0
                    && elapsed >= 0
                    && elapsed as u64 >= self.duration_seconds
            }
        }
    }
}

/// One borrow transaction.
///
/// `returned` only ever goes from false to true. `fine_amount` is
/// recomputed (not accumulated) by [`crate::loans::calculate_fine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    id: LoanId,
    media_id: String,
    member_id: String,
    borrow_date: NaiveDate,
    due_date: NaiveDate,
    returned: bool,
    fine_amount: f64,
    overdue_notification_sent: bool,
    media_kind: Option<MediaKind>,
    testing: Option<TestingWindow>,
}

impl Loan {
    /// Loan for `media`, due after the media's borrow period.
    ///
    /// A due date past the end of the calendar saturates at `NaiveDate::MAX`;
    /// use [`Loan::try_new`] to reject it instead.
    pub fn new(media: &Media, member_id: impl Into<String>, borrow_date: NaiveDate) -> Self {
        let due_date = media.kind.due_date(borrow_date).unwrap_or(NaiveDate::MAX);
        Self::with_due_date(media.id.clone(), member_id, borrow_date, due_date)
            .with_media_kind(media.kind)
    }

    /// Like [`Loan::new`], but fails when the due date is not representable.
    pub fn try_new(
        media: &Media,
        member_id: impl Into<String>,
        borrow_date: NaiveDate,
    ) -> Result<Self, LoanError> {
        let due_date = media.kind.due_date(borrow_date).ok_or_else(|| {
            LoanError::invalid_argument(format!("borrow date {} leaves no room for a due date", borrow_date))
        })?;
        Ok(Self::with_due_date(media.id.clone(), member_id, borrow_date, due_date)
            .with_media_kind(media.kind))
    }

    /// Loan with an explicit due date and no media policy attached.
    ///
    /// Fines on such loans use [`crate::loans::policy::LEGACY_FINE_PER_DAY`].
    pub fn with_due_date(
        media_id: impl Into<String>,
        member_id: impl Into<String>,
        borrow_date: NaiveDate,
        due_date: NaiveDate,
    ) -> Self {
        Self {
            id: LoanId::UNASSIGNED,
            media_id: media_id.into(),
            member_id: member_id.into(),
            borrow_date,
            due_date,
            returned: false,
            fine_amount: 0.0,
            overdue_notification_sent: false,
            media_kind: None,
            testing: None,
        }
    }

    pub fn with_media_kind(mut self, kind: MediaKind) -> Self {
        self.media_kind = Some(kind);
        self
    }

    pub fn with_testing_window(mut self, window: TestingWindow) -> Self {
        self.testing = Some(window);
        self
    }

    pub fn id(&self) -> LoanId {
        self.id
    }

    pub fn media_id(&self) -> &str {
        &self.media_id
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    pub fn borrow_date(&self) -> NaiveDate {
        self.borrow_date
    }

    pub fn due_date(&self) -> NaiveDate {
        self.due_date
    }

    pub fn is_returned(&self) -> bool {
        self.returned
    }

    pub fn is_active(&self) -> bool {
        !self.returned
    }

    pub fn fine_amount(&self) -> f64 {
        self.fine_amount
    }

    pub fn overdue_notification_sent(&self) -> bool {
        self.overdue_notification_sent
    }

    pub fn media_kind(&self) -> Option<MediaKind> {
        self.media_kind
    }

    pub fn testing_window(&self) -> Option<&TestingWindow> {
        self.testing.as_ref()
    }

    pub fn is_testing_mode(&self) -> bool {
        self.testing.is_some()
    }

    /// Active and strictly past the due date.
    pub fn is_overdue(&self, as_of: NaiveDate) -> bool {
        !self.returned && as_of > self.due_date
    }

    /// Whole days past the due date, zero when not overdue.
    pub fn days_overdue(&self, as_of: NaiveDate) -> i64 {
        if self.is_overdue(as_of) {
            (as_of - self.due_date).num_days()
        } else {
            0
        }
    }

    /// Testing-mode expiry; meaningless (false) once returned.
    pub fn is_testing_expired(&self, now: DateTime<Utc>) -> bool {
        !self.returned && self.testing.as_ref().is_some_and(|w| w.is_expired(now))
    }

    pub(crate) fn assign_id(&mut self, id: LoanId) {
        self.id = id;
    }

    pub(crate) fn set_fine_amount(&mut self, amount: f64) {
        self.fine_amount = amount;
    }

    pub(crate) fn mark_returned(&mut self) {
        self.returned = true;
    }

    pub(crate) fn mark_overdue_notification_sent(&mut self) {
        self.overdue_notification_sent = true;
    }
}
