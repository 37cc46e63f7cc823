//! Operator-triggered overdue reminders.
//!
//! Unlike the overdue scanner this is not deduplicated: every call sends
//! one summary per member who currently has overdue loans.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::alerts::email::EmailSender;
use crate::directory::MemberDirectory;
use crate::loans::error::{require_identifier, LoanError};
use crate::loans::types::Member;
use crate::store::LoanStore;

pub const REMINDER_SUBJECT: &str = "Library: Overdue Reminder";

pub struct ReminderService {
    store: Arc<LoanStore>,
    members: Arc<dyn MemberDirectory>,
    email: Arc<dyn EmailSender>,
}

impl ReminderService {
    pub fn new(
        store: Arc<LoanStore>,
        members: Arc<dyn MemberDirectory>,
        email: Arc<dyn EmailSender>,
    ) -> Self {
        Self { store, members, email }
    }

    /// Remind every member with overdue loans. Returns how many were sent.
    pub async fn send_overdue_reminders(&self, as_of: NaiveDate) -> usize {
        let mut sent = 0;
        for member in self.members.all_members().await {
            if self.remind(&member, as_of).await {
                sent += 1;
            }
        }
        tracing::info!("Overdue reminders sent: {}", sent);
        sent
    }

    /// Remind one member. `Ok(false)` when nothing was due or delivery failed.
    pub async fn send_reminder_to(&self, member_id: &str, as_of: NaiveDate) -> Result<bool, LoanError> {
        require_identifier(member_id, "member id")?;
        let member = self
            .members
            .find_member(member_id)
            .await
            .ok_or_else(|| LoanError::member_not_found(member_id))?;
        Ok(self.remind(&member, as_of).await)
    }

    async fn remind(&self, member: &Member, as_of: NaiveDate) -> bool {
        let Some(address) = member.contact_address() else {
            return false;
        };
        let overdue = self.store.find_active_overdue_by_member(&member.id, as_of).await;
        if overdue.is_empty() {
            return false;
        }

        let body = format!("You have {} overdue item(s).", overdue.len());
        match self.email.send(address, REMINDER_SUBJECT, &body).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!("Reminder to {} failed: {}", address, err);
                false
            }
        }
    }
}
