//! Email delivery.
//!
//! [`EmailSender`] abstracts over the delivery service. Production uses
//! [`super::ResendEmailSender`]; development logs emails with
//! [`LoggingEmailSender`]; tests capture them with [`RecordingEmailSender`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::info;

/// A rendered email ready to send.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    /// Recipient address
    pub to: String,
    /// Subject line
    pub subject: String,
    /// HTML body
    pub html: String,
}

/// Email delivery errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    /// Network failure talking to the provider
    #[error("Email request failed: {0}")]
    RequestFailed(String),

    /// Provider answered with an error status
    #[error("Email provider error ({status}): {message}")]
    Provider {
        /// HTTP status
        status: u16,
        /// Response body
        message: String,
    },

    /// Provider rejected the API key
    #[error("Email provider rejected the API key")]
    Unauthorized,
}

/// Email delivery service.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Send one email.
    ///
    /// # Errors
    ///
    /// Returns [`EmailError`] if the provider fails or rejects the message.
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError>;
}

/// Logs emails instead of sending them.
#[derive(Clone, Debug, Default)]
pub struct LoggingEmailSender;

impl LoggingEmailSender {
    /// Create a new logging sender.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EmailSender for LoggingEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            bytes = message.html.len(),
            "Email (development mode, not sent)"
        );
        Ok(())
    }
}

/// Captures sent emails; optionally fails every send.
#[derive(Clone, Debug, Default)]
pub struct RecordingEmailSender {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
    fail: bool,
}

impl RecordingEmailSender {
    /// Sender that records and succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sender whose every send fails with a provider error.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            sent: Arc::default(),
            fail: true,
        }
    }

    /// Emails accepted so far, in send order.
    #[must_use]
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        if self.fail {
            return Err(EmailError::Provider {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.clone());
        }
        Ok(())
    }
}
