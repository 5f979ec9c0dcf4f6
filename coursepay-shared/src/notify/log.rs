/// Notifiers that never leave the process

use super::{EmailMessage, NotifyError, NotifyResult, Notifier};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Logs each message instead of sending it
///
/// Used when no email provider key is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &EmailMessage) -> NotifyResult<()> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            bytes = message.html.len(),
            "Email provider not configured, logging message instead"
        );
        Ok(())
    }
}

/// Keeps sent messages in memory
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    sent: Arc<RwLock<Vec<EmailMessage>>>,
    attempts: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl RecordingNotifier {
    /// Creates an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every send fail while set
    pub fn fail(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }

    /// Messages delivered successfully
    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.read().await.clone()
    }

    /// Send attempts, failed ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &EmailMessage) -> NotifyResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Transport("simulated provider outage".to_string()));
        }
        self.sent.write().await.push(message.clone());
        Ok(())
    }
}
