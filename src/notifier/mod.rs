//! Expiration notifications.
//!
//! The reconciler talks to a [`Notifier`]; [`BrevoNotifier`] is the
//! production implementation. Retries live in [`send_with_retry`], so a
//! single `send` call makes exactly one delivery attempt.

mod brevo;
mod email;
mod retry;
#[cfg(test)]
pub(crate) mod test_utils;

use async_trait::async_trait;
pub use brevo::BrevoNotifier;
use chrono::{DateTime, Utc};
pub use email::{ExpirationEmail, render_expiration_email};
pub use retry::{send_with_retry, with_retry_generic};
use thiserror::Error;

use crate::models::Plan;

/// Everything the owner is told about an expired intention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpirationNotice {
    pub intention_id: String,
    pub recipient: String,
    pub plan: Plan,
    pub template_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Errors returned by a notifier.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Email provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid recipient email: {0:?}")]
    InvalidRecipient(String),

    #[error("Notifier configuration error: {0}")]
    Config(String),
}

impl NotifyError {
    /// Rate limits, server errors and connection/timeout failures may succeed
    /// on another attempt; everything else is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            NotifyError::Status { status, .. } => *status == 429 || *status >= 500,
            NotifyError::Transport(e) => e.is_connect() || e.is_timeout(),
            NotifyError::InvalidRecipient(_) | NotifyError::Config(_) => false,
        }
    }
}

/// Delivers expiration notices.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Make one delivery attempt.
    async fn send(&self, notice: &ExpirationNotice) -> Result<(), NotifyError>;

    /// Get the notifier name (for logging/debugging).
    fn name(&self) -> &'static str;
}
