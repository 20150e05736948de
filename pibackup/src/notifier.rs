//! Telegram notifications
//!
//! Delivery is best effort: one synchronous GET per message, failures are
//! logged and never reach the caller.

use pibackup_common::{Credentials, NotificationError};
use std::time::Duration;

/// Sink for progress notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Sends messages through the Bot API `sendMessage` method
pub struct TelegramNotifier {
    client: reqwest::blocking::Client,
    api_base: String,
    credentials: Credentials,
}

impl TelegramNotifier {
    pub fn new(
        credentials: Credentials,
        api_base: &str,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Full request URL with `chat_id` and `text` percent-encoded
    pub fn message_url(&self, message: &str) -> String {
        format!(
            "{}/bot{}/sendMessage?chat_id={}&parse_mode=Markdown&text={}",
            self.api_base,
            self.credentials.bot_token,
            urlencoding::encode(&self.credentials.chat_id),
            urlencoding::encode(message)
        )
    }

    /// Deliver one message, reporting why it failed
    pub fn send(&self, message: &str) -> Result<(), NotificationError> {
        // reqwest errors carry the URL, which holds the bot token
        let response = self
            .client
            .get(self.message_url(message))
            .send()
            .map_err(|e| NotificationError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NotificationError::Status(status.as_u16()))
        }
    }
}

impl Notifier for TelegramNotifier {
    fn notify(&self, message: &str) {
        log::info!("Sending Notification to Telegram: '{message}'");
        match self.send(message) {
            Ok(()) => log::info!("Notification sent to Telegram."),
            Err(e) => log::error!("Failed to send notification to Telegram: {e}"),
        }
    }
}
