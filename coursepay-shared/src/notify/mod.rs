/// Buyer notifications
///
/// Email is a best-effort side effect. Callers go through [`dispatch`], which
/// awaits the send, logs any failure at `warn`, and returns nothing, so a
/// provider outage can never change a checkout result or a webhook
/// acknowledgement. There is no retry.
///
/// # Implementations
///
/// - [`resend::ResendNotifier`]: Resend HTTP API
/// - [`log::LogNotifier`]: writes the message to the log (no provider key)
/// - [`log::RecordingNotifier`]: keeps messages in memory for tests

pub mod log;
pub mod resend;
pub mod templates;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::log::{LogNotifier, RecordingNotifier};
pub use self::resend::{ResendConfig, ResendNotifier};

/// Notification errors
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Network failure talking to the provider
    #[error("Email transport error: {0}")]
    Transport(String),

    /// Provider refused the message
    #[error("Email provider returned HTTP {status}: {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body excerpt
        message: String,
    },
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        NotifyError::Transport(err.to_string())
    }
}

/// Notification result type alias
pub type NotifyResult<T> = Result<T, NotifyError>;

/// A rendered email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    /// Recipient address
    pub to: String,

    /// Subject line
    pub subject: String,

    /// HTML body
    pub html: String,
}

/// Email delivery
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends one message
    async fn send(&self, message: &EmailMessage) -> NotifyResult<()>;
}

/// Sends a message, logging and discarding any failure
pub async fn dispatch(notifier: &dyn Notifier, message: EmailMessage) {
    match notifier.send(&message).await {
        Ok(()) => {
            tracing::debug!(to = %message.to, subject = %message.subject, "Notification sent");
        }
        Err(e) => {
            tracing::warn!(
                to = %message.to,
                subject = %message.subject,
                error = %e,
                "Notification failed, not retrying"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> EmailMessage {
        EmailMessage {
            to: "a@b.com".to_string(),
            subject: "Hi".to_string(),
            html: "<p>hi</p>".to_string(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_records_on_success() {
        let notifier = RecordingNotifier::new();
        dispatch(&notifier, message()).await;
        assert_eq!(notifier.sent().await, vec![message()]);
    }

    #[tokio::test]
    async fn test_dispatch_swallows_failure() {
        let notifier = RecordingNotifier::new();
        notifier.fail(true);

        dispatch(&notifier, message()).await;

        assert!(notifier.sent().await.is_empty());
        assert_eq!(notifier.attempts(), 1);
    }

    #[test]
    fn test_rejected_display() {
        let err = NotifyError::Rejected {
            status: 422,
            message: "invalid from".to_string(),
        };
        assert_eq!(err.to_string(), "Email provider returned HTTP 422: invalid from");
    }
}
