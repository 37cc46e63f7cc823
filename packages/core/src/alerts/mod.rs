//! Outbound member notifications.

pub mod email;
pub mod mock;
pub mod overdue;
pub mod reminder;

pub use email::{EmailError, EmailSender, LogEmailSender, SmtpEmailSender};
pub use overdue::{OverdueEmailNotifier, OverdueLoan, OverdueNotifier};
pub use reminder::ReminderService;
