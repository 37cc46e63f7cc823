//! Loan lifecycle
//!
//! Everything that governs a loan from the moment a borrow succeeds to the
//! moment it is returned or evicted: media policy, fines, eligibility rules,
//! the foreground borrow/return service and the two background passes
//! (overdue scanning and testing-mode expiry).

pub mod duration;
pub mod error;
pub mod fine;
pub mod policy;
pub mod rules;
pub mod scanner;
pub mod service;
pub mod types;
pub mod watcher;

pub use duration::TestingDuration;
pub use error::LoanError;
pub use fine::{calculate_fine, preview_fine};
pub use rules::BorrowingRules;
pub use scanner::{OverdueScanner, ScanReport};
pub use service::LoanService;
pub use types::*;
pub use watcher::{PollReport, TestingModeWatcher};
