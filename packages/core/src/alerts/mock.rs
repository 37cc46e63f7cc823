//! Recording email sender for tests and demos.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::alerts::email::{EmailError, EmailSender};

/// A message captured by [`RecordingEmailSender`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Records every successful send; can be told to fail the next N sends,
/// or to park the next send until released.
#[derive(Debug, Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<SentEmail>>,
    failures_remaining: AtomicUsize,
    attempts: AtomicUsize,
    hold_next: AtomicBool,
    held: Notify,
    released: Notify,
}

impl RecordingEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` sends fail with a transport error.
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Successfully delivered messages, oldest first.
    pub async fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Every call to `send`, failed or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Park the next send until [`release`](Self::release) is called.
    pub fn hold_next(&self) {
        self.hold_next.store(true, Ordering::SeqCst);
    }

    /// Wait until a send is parked by [`hold_next`](Self::hold_next).
    pub async fn wait_until_held(&self) {
        self.held.notified().await;
    }

    /// Let the parked send continue.
    pub fn release(&self) {
        self.released.notify_one();
    }

    pub async fn clear(&self) {
        self.sent.lock().await.clear();
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.hold_next.swap(false, Ordering::SeqCst) {
            self.held.notify_one();
            self.released.notified().await;
        }

        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(EmailError::transport("injected failure"));
        }

        self.sent.lock().await.push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}
