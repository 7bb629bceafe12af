//! Discord REST API backend.
//!
//! Speaks the v10 channel-messages endpoints with JSON bodies and a bot
//! token. Content is wrapped in a Markdown code span for a monospace bar.

use async_trait::async_trait;

use super::{truncate_chars, Backend, MessageId, SinkError};
use crate::config;

const API_BASE: &str = "https://discord.com/api/v10";
// Discord caps message content at 2000 chars; leave room for the code span.
const MESSAGE_LIMIT: usize = 1990;
/// Identifies the crate, as the Discord API guidelines require.
const USER_AGENT: &str = concat!(
    "barcast progress mirror (https://crates.io/crates/barcast, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// Destination and credential for a Discord mirror.
///
/// Unset fields fall back to [`config::ENV_DISCORD_TOKEN`] and
/// [`config::ENV_DISCORD_CHANNEL_ID`] when the backend is built.
#[derive(Debug, Clone, Default)]
pub struct DiscordConfig {
    /// Bot token from the Discord developer portal.
    pub token: Option<String>,
    /// Target channel identifier (snowflake).
    pub channel_id: Option<String>,
}

impl DiscordConfig {
    fn resolve(self) -> Result<(String, String), SinkError> {
        let token = config::resolve_field(
            self.token,
            config::ENV_DISCORD_TOKEN,
            "discord token (BARCAST_DISCORD_TOKEN)",
        )?;
        let channel_id = config::resolve_field(
            self.channel_id,
            config::ENV_DISCORD_CHANNEL_ID,
            "discord channel id (BARCAST_DISCORD_CHANNEL_ID)",
        )?;
        Ok((token, channel_id))
    }
}

/// [`Backend`] over the Discord REST API.
#[derive(Debug)]
pub struct DiscordBackend {
    client: reqwest::Client,
    token: String,
    channel_id: String,
}

impl DiscordBackend {
    /// Build a backend from explicit or environment configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::MissingConfig`] when neither an explicit value
    /// nor the environment provides the token or channel id.
    pub fn new(config: DiscordConfig) -> Result<Self, SinkError> {
        let (token, channel_id) = config.resolve()?;
        Ok(Self {
            client: super::http_client(),
            token,
            channel_id,
        })
    }

    fn messages_url(&self) -> String {
        format!("{API_BASE}/channels/{}/messages", self.channel_id)
    }

    fn message_url(&self, id: &MessageId) -> String {
        format!("{}/{}", self.messages_url(), id)
    }

    /// Attach auth headers, send, and map non-success statuses.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, SinkError> {
        let response = request
            .header("Authorization", format!("Bot {}", self.token))
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| SinkError::Network(e.to_string()))?;
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SinkError::RateLimited(error_body(response).await));
        }
        if !status.is_success() {
            return Err(SinkError::Api(format!(
                "{status}: {}",
                error_body(response).await
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl Backend for DiscordBackend {
    fn label(&self) -> &'static str {
        "DiscordSink"
    }

    async fn create(&self, text: &str) -> Result<MessageId, SinkError> {
        let response = self
            .send(
                self.client
                    .post(self.messages_url())
                    .json(&serde_json::json!({ "content": code_span(text) })),
            )
            .await?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SinkError::MalformedResponse(e.to_string()))?;
        parse_message_id(&body)
    }

    async fn edit(&self, id: &MessageId, text: &str) -> Result<(), SinkError> {
        self.send(
            self.client
                .patch(self.message_url(id))
                .json(&serde_json::json!({ "content": code_span(text) })),
        )
        .await
        .map(|_| ())
    }

    async fn delete(&self, id: &MessageId) -> Result<(), SinkError> {
        self.send(self.client.delete(self.message_url(id)))
            .await
            .map(|_| ())
    }
}

/// Extract the message snowflake from a create response.
fn parse_message_id(body: &serde_json::Value) -> Result<MessageId, SinkError> {
    body.get("id")
        .and_then(serde_json::Value::as_str)
        .map(MessageId::new)
        .ok_or_else(|| {
            SinkError::MalformedResponse("message response carried no id".to_string())
        })
}

/// Short error-body excerpt for diagnostics; bodies can be arbitrarily large.
async fn error_body(response: reqwest::Response) -> String {
    let text = response.text().await.unwrap_or_default();
    truncate_chars(&text, 200).to_string()
}

/// Wrap text in a Markdown code span. Discord offers no escape for a
/// backtick inside a span, so embedded backticks become apostrophes.
fn code_span(text: &str) -> String {
    let cleaned = truncate_chars(text, MESSAGE_LIMIT).replace('`', "'");
    format!("`{cleaned}`")
}
