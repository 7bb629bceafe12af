//! Environment-backed configuration shared by the remote sinks.
//!
//! Backend config structs carry explicit optional fields; anything left
//! unset falls back to the named environment variable below, resolved once
//! at sink construction time and never cached globally.

use crate::sink::SinkError;

/// Environment fallback for the Telegram bot token.
pub const ENV_TELEGRAM_TOKEN: &str = "BARCAST_TELEGRAM_TOKEN";
/// Environment fallback for the Telegram chat identifier.
pub const ENV_TELEGRAM_CHAT_ID: &str = "BARCAST_TELEGRAM_CHAT_ID";
/// Environment fallback for the Discord bot token.
pub const ENV_DISCORD_TOKEN: &str = "BARCAST_DISCORD_TOKEN";
/// Environment fallback for the Discord channel identifier.
pub const ENV_DISCORD_CHANNEL_ID: &str = "BARCAST_DISCORD_CHANNEL_ID";

/// Request timeout applied to every sink HTTP call, in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// HTTP timeout from `BARCAST_HTTP_TIMEOUT_SECS` or the default.
///
/// A hung call occupies the sink's worker thread until this elapses; the
/// bounded backlog keeps memory flat in the meantime.
#[must_use]
pub fn http_timeout_secs() -> u64 {
    std::env::var("BARCAST_HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS)
}

/// Resolve a config field: explicit value first, then the environment.
/// Empty strings count as unset.
pub(crate) fn resolve_field(
    explicit: Option<String>,
    env_var: &str,
    what: &'static str,
) -> Result<String, SinkError> {
    explicit
        .or_else(|| std::env::var(env_var).ok())
        .filter(|value| !value.is_empty())
        .ok_or(SinkError::MissingConfig(what))
}
