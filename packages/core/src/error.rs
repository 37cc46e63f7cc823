use std::error::Error;
use std::fmt;

use crate::alerts::email::EmailError;

/// Process-level error for the binary.
///
/// Domain failures stay in `LoanError` / `EmailError`; this only covers
/// what can stop the service from starting or serving.
#[derive(Debug)]
pub enum AppError {
    Config(String),
    Email(EmailError),
    Server(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "Config error: {}", msg),
            AppError::Email(err) => write!(f, "Email error: {}", err),
            AppError::Server(msg) => write!(f, "Server error: {}", msg),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Email(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EmailError> for AppError {
    fn from(err: EmailError) -> Self {
        AppError::Email(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Server(err.to_string())
    }
}
