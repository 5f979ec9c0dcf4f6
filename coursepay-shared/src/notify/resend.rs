/// Resend email adapter
///
/// `POST {api_base}/emails` with a bearer key and a JSON body of
/// `{from, to, subject, html}`.

use super::{EmailMessage, NotifyError, NotifyResult, Notifier};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Default Resend API base URL
pub const DEFAULT_API_BASE: &str = "https://api.resend.com";

/// Default sender
pub const DEFAULT_FROM: &str = "Global Trainer <noreply@globaltrainer.com.br>";

/// Resend client configuration
#[derive(Debug, Clone)]
pub struct ResendConfig {
    /// API key
    pub api_key: String,

    /// Sender shown to the buyer
    pub from: String,

    /// API base URL
    pub api_base: String,

    /// Request bound
    pub timeout: Duration,
}

impl Default for ResendConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            from: DEFAULT_FROM.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Serialize)]
struct SendBody<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

/// Resend notifier
#[derive(Clone)]
pub struct ResendNotifier {
    client: Client,
    config: ResendConfig,
}

impl ResendNotifier {
    /// Builds a client with the configured timeout
    pub fn new(config: ResendConfig) -> NotifyResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        Ok(ResendNotifier { client, config })
    }
}

#[async_trait]
impl Notifier for ResendNotifier {
    async fn send(&self, message: &EmailMessage) -> NotifyResult<()> {
        let body = SendBody {
            from: &self.config.from,
            to: [&message.to],
            subject: &message.subject,
            html: &message.html,
        };

        let response = self
            .client
            .post(format!("{}/emails", self.config.api_base.trim_end_matches('/')))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status,
                message: text.chars().take(512).collect(),
            });
        }

        Ok(())
    }
}
