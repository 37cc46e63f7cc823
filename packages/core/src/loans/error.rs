//! Error types for loan operations

use thiserror::Error;

/// Errors surfaced synchronously to whoever tried to create or mutate a loan.
///
/// Background passes never produce these; they log and carry on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoanError {
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Invalid testing duration: {message}")]
    InvalidDuration { message: String },

    #[error("Member not found: {member_id}")]
    MemberNotFound { member_id: String },

    #[error("Media not found: {media_id}")]
    MediaNotFound { media_id: String },

    #[error("Media already borrowed: {media_id}")]
    AlreadyBorrowed { media_id: String },

    #[error("Borrowing not allowed: {reason}")]
    NotEligible { reason: String },
}

impl LoanError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    pub fn invalid_duration(message: impl Into<String>) -> Self {
        Self::InvalidDuration { message: message.into() }
    }

    pub fn member_not_found(member_id: impl Into<String>) -> Self {
        Self::MemberNotFound { member_id: member_id.into() }
    }

    pub fn media_not_found(media_id: impl Into<String>) -> Self {
        Self::MediaNotFound { media_id: media_id.into() }
    }

    pub fn already_borrowed(media_id: impl Into<String>) -> Self {
        Self::AlreadyBorrowed { media_id: media_id.into() }
    }

    pub fn not_eligible(reason: impl Into<String>) -> Self {
        Self::NotEligible { reason: reason.into() }
    }
}

/// Reject blank identifiers before they reach the store.
pub(crate) fn require_identifier(value: &str, what: &str) -> Result<(), LoanError> {
    if value.trim().is_empty() {
        return Err(LoanError::invalid_argument(format!("{} must not be blank", what)));
    }
    Ok(())
}
