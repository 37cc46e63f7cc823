//! Per-media-type borrowing policy.
//!
//! Both lookups match exhaustively on [`MediaKind`], so a new variant cannot
//! be added without giving it a borrow period and a daily fine.

use chrono::{Days, NaiveDate};

use crate::loans::types::MediaKind;

pub const BOOK_BORROW_PERIOD_DAYS: u32 = 28;
pub const CD_BORROW_PERIOD_DAYS: u32 = 7;

pub const BOOK_FINE_PER_DAY: f64 = 10.0;
pub const CD_FINE_PER_DAY: f64 = 20.0;

/// Daily rate for loans created without a media record attached.
pub const LEGACY_FINE_PER_DAY: f64 = 0.5;

/// Number of days an item of this kind may be kept.
pub fn borrow_period_days(kind: MediaKind) -> u32 {
    match kind {
        MediaKind::Book => BOOK_BORROW_PERIOD_DAYS,
        MediaKind::Cd => CD_BORROW_PERIOD_DAYS,
    }
}

/// Fine charged per overdue day for an item of this kind.
pub fn fine_per_day(kind: MediaKind) -> f64 {
    match kind {
        MediaKind::Book => BOOK_FINE_PER_DAY,
        MediaKind::Cd => CD_FINE_PER_DAY,
    }
}

/// `borrow_date + days`, or `None` past the end of the calendar.
pub fn due_date_after(borrow_date: NaiveDate, days: u64) -> Option<NaiveDate> {
    borrow_date.checked_add_days(Days::new(days))
}

impl MediaKind {
    pub fn borrow_period_days(self) -> u32 {
        borrow_period_days(self)
    }

    pub fn fine_per_day(self) -> f64 {
        fine_per_day(self)
    }

    /// Standard due date for an item of this kind borrowed on `borrow_date`.
    pub fn due_date(self, borrow_date: NaiveDate) -> Option<NaiveDate> {
        due_date_after(borrow_date, u64::from(borrow_period_days(self)))
    }
}
