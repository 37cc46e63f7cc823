//! Testing-mode loan duration

use chrono::Duration;

use crate::loans::error::LoanError;

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: u64 = 24 * SECONDS_PER_HOUR;

/// A strictly positive wall-clock duration for a testing-mode loan.
///
/// Zero is rejected: such a loan would expire the moment it was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestingDuration {
    total_seconds: u64,
}

impl TestingDuration {
    /// Build from days/hours/minutes/seconds as typed by an operator.
    pub fn from_components(days: i64, hours: i64, minutes: i64, seconds: i64) -> Result<Self, LoanError> {
        if days < 0 || hours < 0 || minutes < 0 || seconds < 0 {
            return Err(LoanError::invalid_duration("duration components cannot be negative"));
        }
        if days == 0 && hours == 0 && minutes == 0 && seconds == 0 {
            return Err(LoanError::invalid_duration("testing duration must be greater than zero"));
        }

        let total = [
            (days, SECONDS_PER_DAY),
            (hours, SECONDS_PER_HOUR),
            (minutes, SECONDS_PER_MINUTE),
            (seconds, 1),
        ]
        .into_iter()
        .try_fold(0u64, |acc, (value, unit)| {
            (value as u64).checked_mul(unit).and_then(|part| acc.checked_add(part))
        })
        .filter(|total| *total <= i64::MAX as u64 / 1_000)
        .ok_or_else(|| LoanError::invalid_duration("testing duration is too large"))?;

        Ok(Self { total_seconds: total })
    }

    pub fn from_seconds(seconds: u64) -> Result<Self, LoanError> {
        let seconds = i64::try_from(seconds)
            .map_err(|_| LoanError::invalid_duration("testing duration is too large"))?;
        Self::from_components(0, 0, 0, seconds)
    }

    pub fn total_seconds(&self) -> u64 {
        self.total_seconds
    }

    pub fn as_chrono(&self) -> Duration {
        Duration::seconds(self.total_seconds as i64)
    }

    /// Calendar days the loan spans, rounding any partial day up.
    pub fn calendar_days(&self) -> u64 {
        self.total_seconds.div_ceil(SECONDS_PER_DAY)
    }
}
