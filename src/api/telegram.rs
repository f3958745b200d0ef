use crate::config::TelegramSettings;
use crate::notifications::Notifier;
use crate::{BotError, Result};
use reqwest::Client;
use tokio::time::Duration;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const SEND_TIMEOUT_SECS: u64 = 5;

/// Telegram Bot API notifier
///
/// Disabled (every send is a no-op returning `false`) when either the token
/// or the chat id is missing.
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    base_url: String,
    token: Option<String>,
    chat_id: Option<String>,
}

impl TelegramNotifier {
    pub fn new(settings: &TelegramSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(SEND_TIMEOUT_SECS))
            .build()?;

        if !settings.is_configured() {
            tracing::warn!("Telegram not configured, notifications disabled");
        }

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            chat_id: settings.chat_id.clone(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.token.is_some() && self.chat_id.is_some()
    }

    /// POST one message to `sendMessage`
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let (Some(token), Some(chat_id)) = (&self.token, &self.chat_id) else {
            return Err(BotError::Notification("Telegram not configured".into()));
        };

        let url = format!("{}/bot{}/sendMessage", self.base_url, token);
        let response = self
            .client
            .post(&url)
            .query(&[("chat_id", chat_id.as_str()), ("text", text)])
            .send()
            .await
            // The URL carries the token, keep it out of the error text
            .map_err(|e| BotError::Notification(e.without_url().to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(BotError::Notification(format!(
                "Telegram API error {}: {}",
                status, body
            )));
        }

        Ok(())
    }
}

impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) -> bool {
        if !self.is_enabled() {
            tracing::debug!("Telegram disabled, dropping message: {}", text);
            return false;
        }

        match self.send_message(text).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Telegram send failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn settings(base_url: &str, configured: bool) -> TelegramSettings {
        TelegramSettings {
            token: configured.then(|| "TOKEN".to_string()),
            chat_id: configured.then(|| "42".to_string()),
            base_url: base_url.to_string(),
        }
    }

    #[tokio::test]
    async fn test_notify_posts_message() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botTOKEN/sendMessage")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("chat_id".into(), "42".into()),
                Matcher::UrlEncoded("text".into(), "BUY executed SOLUSDC".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let notifier = TelegramNotifier::new(&settings(&server.url(), true)).unwrap();
        assert!(notifier.notify("BUY executed SOLUSDC").await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_notify_swallows_api_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/botTOKEN/sendMessage")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"ok":false,"description":"chat not found"}"#)
            .create_async()
            .await;

        let notifier = TelegramNotifier::new(&settings(&server.url(), true)).unwrap();
        assert!(!notifier.notify("hello").await);

        let err = notifier.send_message("hello").await.unwrap_err();
        assert!(err.to_string().contains("chat not found"));
    }

    #[tokio::test]
    async fn test_disabled_notifier_sends_nothing() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let notifier = TelegramNotifier::new(&settings(&server.url(), false)).unwrap();
        assert!(!notifier.is_enabled());
        assert!(!notifier.notify("hello").await);
        mock.assert_async().await;
    }
}
