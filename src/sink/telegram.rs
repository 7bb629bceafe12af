//! Telegram Bot API backend.
//!
//! Speaks the `sendMessage`/`editMessageText`/`deleteMessage` methods with
//! form-encoded bodies. Content is wrapped in a MarkdownV2 code span so the
//! bar renders in a monospace font inside the chat.

use async_trait::async_trait;
use serde::Deserialize;

use super::{truncate_chars, Backend, MessageId, SinkError};
use crate::config;

const API_BASE: &str = "https://api.telegram.org/bot";
const PARSE_MODE: &str = "MarkdownV2";
// Telegram caps messages at 4096 chars; leave room for the code span and escapes.
const MESSAGE_LIMIT: usize = 4000;

/// Destination and credential for a Telegram mirror.
///
/// Unset fields fall back to [`config::ENV_TELEGRAM_TOKEN`] and
/// [`config::ENV_TELEGRAM_CHAT_ID`] when the backend is built.
#[derive(Debug, Clone, Default)]
pub struct TelegramConfig {
    /// Bot token issued by `@BotFather`.
    pub token: Option<String>,
    /// Target chat identifier (find it via the bot's `getUpdates`).
    pub chat_id: Option<String>,
}

impl TelegramConfig {
    fn resolve(self) -> Result<(String, String), SinkError> {
        let token = config::resolve_field(
            self.token,
            config::ENV_TELEGRAM_TOKEN,
            "telegram token (BARCAST_TELEGRAM_TOKEN)",
        )?;
        let chat_id = config::resolve_field(
            self.chat_id,
            config::ENV_TELEGRAM_CHAT_ID,
            "telegram chat id (BARCAST_TELEGRAM_CHAT_ID)",
        )?;
        Ok((token, chat_id))
    }
}

/// Envelope every Bot API method answers with.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: serde_json::Value,
}

impl ApiResponse {
    fn into_result(self, method: &str) -> Result<serde_json::Value, SinkError> {
        if self.ok {
            return Ok(self.result);
        }
        let description = self
            .description
            .unwrap_or_else(|| "no description".to_string());
        if self.error_code == Some(429) {
            Err(SinkError::RateLimited(format!("{method}: {description}")))
        } else {
            Err(SinkError::Api(format!("{method}: {description}")))
        }
    }
}

/// [`Backend`] over the Telegram Bot API.
#[derive(Debug)]
pub struct TelegramBackend {
    client: reqwest::Client,
    token: String,
    chat_id: String,
}

impl TelegramBackend {
    /// Build a backend from explicit or environment configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::MissingConfig`] when neither an explicit value
    /// nor the environment provides the token or chat id.
    pub fn new(config: TelegramConfig) -> Result<Self, SinkError> {
        let (token, chat_id) = config.resolve()?;
        Ok(Self {
            client: super::http_client(),
            token,
            chat_id,
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{API_BASE}{}/{method}", self.token)
    }

    async fn call(
        &self,
        method: &str,
        form: &[(&str, String)],
    ) -> Result<serde_json::Value, SinkError> {
        let response = self
            .client
            .post(self.url(method))
            .form(form)
            .send()
            .await
            .map_err(|e| SinkError::Network(e.to_string()))?;
        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| SinkError::MalformedResponse(e.to_string()))?;
        body.into_result(method)
    }
}

#[async_trait]
impl Backend for TelegramBackend {
    fn label(&self) -> &'static str {
        "TelegramSink"
    }

    async fn create(&self, text: &str) -> Result<MessageId, SinkError> {
        let result = self
            .call(
                "sendMessage",
                &[
                    ("chat_id", self.chat_id.clone()),
                    ("text", code_span(text)),
                    ("parse_mode", PARSE_MODE.to_string()),
                ],
            )
            .await?;
        let id = result
            .get("message_id")
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| {
                SinkError::MalformedResponse(
                    "sendMessage response carried no message_id".to_string(),
                )
            })?;
        Ok(MessageId::new(id.to_string()))
    }

    async fn edit(&self, id: &MessageId, text: &str) -> Result<(), SinkError> {
        self.call(
            "editMessageText",
            &[
                ("chat_id", self.chat_id.clone()),
                ("message_id", id.as_str().to_string()),
                ("text", code_span(text)),
                ("parse_mode", PARSE_MODE.to_string()),
            ],
        )
        .await
        .map(|_| ())
    }

    async fn delete(&self, id: &MessageId) -> Result<(), SinkError> {
        self.call(
            "deleteMessage",
            &[
                ("chat_id", self.chat_id.clone()),
                ("message_id", id.as_str().to_string()),
            ],
        )
        .await
        .map(|_| ())
    }
}

/// Wrap text in a MarkdownV2 code span. Inside a span only backslash and
/// backtick are special.
fn code_span(text: &str) -> String {
    let escaped = truncate_chars(text, MESSAGE_LIMIT)
        .replace('\\', "\\\\")
        .replace('`', "\\`");
    format!("`{escaped}`")
}
