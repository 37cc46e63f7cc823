//! Email delivery.
//!
//! [`EmailSender`] is the only transport contract the circulation core
//! depends on. [`SmtpEmailSender`] delivers through `lettre`;
//! [`LogEmailSender`] writes messages to the log when no SMTP relay is
//! configured. Errors propagate to the caller, which decides whether to
//! retry; no timeout is imposed here.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use thiserror::Error;

use crate::config::SmtpConfig;

/// Errors from an email transport.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmailError {
    #[error("Invalid address {address}: {message}")]
    InvalidAddress { address: String, message: String },

    #[error("Failed to build email: {message}")]
    Build { message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },
}

impl EmailError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into() }
    }
}

/// Capability to send one plain-text email.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError>;
}

fn parse_mailbox(address: &str) -> Result<Mailbox, EmailError> {
    address.parse().map_err(|e: lettre::address::AddressError| EmailError::InvalidAddress {
        address: address.to_string(),
        message: e.to_string(),
    })
}

/// SMTP delivery via `lettre`.
#[derive(Debug, Clone)]
pub struct SmtpEmailSender {
    config: SmtpConfig,
    from: Mailbox,
}

impl SmtpEmailSender {
    /// Validate the sender address and relay settings up front so a
    /// misconfigured relay fails at startup rather than on the first notice.
    pub fn new(config: SmtpConfig) -> Result<Self, EmailError> {
        let from = parse_mailbox(&config.from)?;
        let sender = Self { config, from };
        sender.build_transport()?;
        Ok(sender)
    }

    fn build_message(&self, to: &str, subject: &str, body: &str) -> Result<Message, EmailError> {
        let to_mailbox = parse_mailbox(to)?;

        Message::builder()
            .from(self.from.clone())
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| EmailError::Build { message: e.to_string() })
    }

    fn build_transport(&self) -> Result<SmtpTransport, EmailError> {
        let builder = if self.config.use_tls {
            SmtpTransport::starttls_relay(&self.config.host)
                .map_err(|e| EmailError::transport(format!("failed to create SMTP transport: {}", e)))?
        } else {
            SmtpTransport::builder_dangerous(&self.config.host)
        }
        .port(self.config.port);

        let builder = match (&self.config.username, &self.config.password) {
            (Some(username), Some(password)) => {
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => builder,
        };

        Ok(builder.build())
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError> {
        let message = self.build_message(to, subject, body)?;
        let mailer = self.build_transport()?;

        // lettre's SmtpTransport blocks; keep it off the runtime workers.
        tokio::task::spawn_blocking(move || mailer.send(&message))
            .await
            .map_err(|e| EmailError::transport(format!("email task failed: {}", e)))?
            .map_err(|e| EmailError::transport(e.to_string()))?;

        tracing::debug!("Email delivered to {}", to);
        Ok(())
    }
}

/// Writes every message to the log instead of sending it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError> {
        tracing::info!(to, subject, body, "Email (log only)");
        Ok(())
    }
}
