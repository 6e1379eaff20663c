//! Outbound Telegram Bot API calls.

use super::types::OutgoingMessage;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::info;

/// Default Bot API base URL.
pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Bot API errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelegramError {
    /// Network failure
    #[error("Telegram request failed: {0}")]
    RequestFailed(String),

    /// Bot API answered `ok: false`
    #[error("Telegram API error ({status}): {description}")]
    Api {
        /// HTTP status
        status: u16,
        /// `description` from the response
        description: String,
    },
}

/// Calls the dispatcher and notifier make against the Bot API.
#[async_trait]
pub trait TelegramApi: Send + Sync {
    /// `sendMessage`
    ///
    /// # Errors
    ///
    /// Returns [`TelegramError`] if the request fails.
    async fn send_message(&self, message: &OutgoingMessage) -> Result<(), TelegramError>;

    /// `answerCallbackQuery`
    ///
    /// # Errors
    ///
    /// Returns [`TelegramError`] if the request fails.
    async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: &str,
    ) -> Result<(), TelegramError>;
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    #[serde(flatten)]
    message: &'a OutgoingMessage,
    parse_mode: &'static str,
}

#[derive(Serialize)]
struct AnswerCallbackRequest<'a> {
    callback_query_id: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// HTTP client for `https://api.telegram.org/bot<token>/<method>`.
#[derive(Clone)]
pub struct BotApiClient {
    client: Client,
    token: String,
    api_url: String,
}

impl std::fmt::Debug for BotApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotApiClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl BotApiClient {
    /// Create a client for a bot token
    #[must_use]
    pub fn new(token: String) -> Self {
        Self {
            client: Client::new(),
            token,
            api_url: TELEGRAM_API_URL.to_string(),
        }
    }

    /// Override the API base URL
    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    async fn call<T: Serialize + Sync>(&self, method: &str, body: &T) -> Result<(), TelegramError> {
        let response = self
            .client
            .post(format!("{}/bot{}/{method}", self.api_url, self.token))
            .json(body)
            .send()
            .await
            .map_err(|e| TelegramError::RequestFailed(e.without_url().to_string()))?;

        let status = response.status();
        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| TelegramError::RequestFailed(e.without_url().to_string()))?;

        if status.is_success() && parsed.ok {
            Ok(())
        } else {
            Err(TelegramError::Api {
                status: status.as_u16(),
                description: parsed.description.unwrap_or_default(),
            })
        }
    }
}

#[async_trait]
impl TelegramApi for BotApiClient {
    async fn send_message(&self, message: &OutgoingMessage) -> Result<(), TelegramError> {
        self.call(
            "sendMessage",
            &SendMessageRequest {
                message,
                parse_mode: "HTML",
            },
        )
        .await
    }

    async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: &str,
    ) -> Result<(), TelegramError> {
        self.call(
            "answerCallbackQuery",
            &AnswerCallbackRequest {
                callback_query_id,
                text,
            },
        )
        .await
    }
}

/// Logs outgoing calls instead of sending them (no bot token configured).
#[derive(Clone, Debug, Default)]
pub struct LoggingTelegramApi;

#[async_trait]
impl TelegramApi for LoggingTelegramApi {
    async fn send_message(&self, message: &OutgoingMessage) -> Result<(), TelegramError> {
        info!(chat_id = message.chat_id, text = %message.text, "Telegram message (not sent)");
        Ok(())
    }

    async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: &str,
    ) -> Result<(), TelegramError> {
        info!(callback_query_id, text, "Telegram callback answer (not sent)");
        Ok(())
    }
}

/// Captures outgoing calls for assertions.
#[derive(Clone, Debug, Default)]
pub struct RecordingTelegramApi {
    messages: Arc<Mutex<Vec<OutgoingMessage>>>,
    answers: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingTelegramApi {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far
    #[must_use]
    pub fn messages(&self) -> Vec<OutgoingMessage> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    /// Callback answers sent so far, as `(callback_query_id, text)`
    #[must_use]
    pub fn answers(&self) -> Vec<(String, String)> {
        self.answers.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TelegramApi for RecordingTelegramApi {
    async fn send_message(&self, message: &OutgoingMessage) -> Result<(), TelegramError> {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.clone());
        }
        Ok(())
    }

    async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: &str,
    ) -> Result<(), TelegramError> {
        if let Ok(mut answers) = self.answers.lock() {
            answers.push((callback_query_id.to_string(), text.to_string()));
        }
        Ok(())
    }
}
