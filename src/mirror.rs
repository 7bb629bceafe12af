//! Glue between the meter lifecycle and a remote sink.
//!
//! A [`RemoteMirror`] re-renders every displayed frame at a fixed bar width
//! suitable for a chat message and hands it to its [`RemoteSink`]; the sink
//! dedups and dispatches from there. On close it applies the leave policy:
//! a bar that stays visible locally keeps its remote message too.

use std::time::Duration;

use crate::meter::{MeterHooks, Snapshot};
use crate::sink::discord::{DiscordBackend, DiscordConfig};
use crate::sink::telegram::{TelegramBackend, TelegramConfig};
use crate::sink::{Backend, RemoteSink, SinkError};

/// Bar width used for remote text, where terminal width is meaningless.
pub const REMOTE_BAR_WIDTH: usize = 10;

/// Default redraw interval when a chat mirror is attached. Bot APIs
/// throttle rapid message edits; one frame per second stays well clear.
pub const REMOTE_MININTERVAL: Duration = Duration::from_secs(1);

/// [`MeterHooks`] implementation that mirrors displayed frames to a
/// [`RemoteSink`].
pub struct RemoteMirror<B> {
    sink: RemoteSink<B>,
}

impl<B: Backend> RemoteMirror<B> {
    /// Mirror through a sink wrapping `backend`.
    ///
    /// Constructing the mirror posts the initial remote message; see
    /// [`RemoteSink::new`].
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            sink: RemoteSink::new(backend),
        }
    }

    /// The underlying sink.
    #[must_use]
    pub fn sink(&self) -> &RemoteSink<B> {
        &self.sink
    }
}

impl RemoteMirror<TelegramBackend> {
    /// Mirror to a Telegram chat using explicit or environment
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::MissingConfig`] when token or chat id cannot be
    /// resolved. Network failures do not surface here; they leave the sink
    /// inert instead.
    pub fn telegram(config: TelegramConfig) -> Result<Self, SinkError> {
        Ok(Self::new(TelegramBackend::new(config)?))
    }
}

impl RemoteMirror<DiscordBackend> {
    /// Mirror to a Discord channel using explicit or environment
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::MissingConfig`] when token or channel id cannot
    /// be resolved.
    pub fn discord(config: DiscordConfig) -> Result<Self, SinkError> {
        Ok(Self::new(DiscordBackend::new(config)?))
    }
}

impl<B: Backend> MeterHooks for RemoteMirror<B> {
    fn on_display(&mut self, snapshot: &Snapshot) {
        // fire-and-forget: failures stay on the dropped handle
        let _ = self.sink.update(&snapshot.format_meter(REMOTE_BAR_WIDTH));
    }

    fn on_clear(&mut self, snapshot: &Snapshot) {
        if !snapshot.disable {
            let _ = self.sink.update("");
        }
    }

    fn on_close(&mut self, snapshot: &Snapshot) {
        if snapshot.disable {
            return;
        }
        let keep = snapshot.leave.unwrap_or(snapshot.position == 0);
        if !keep {
            let _ = self.sink.delete();
        }
    }
}
