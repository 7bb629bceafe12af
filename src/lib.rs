#![deny(missing_docs)]
//! Terminal progress bars mirrored to chat services.
//!
//! The iteration loop stays non-blocking: every remote call runs on a
//! dedicated worker thread behind a backlog bounded at two entries, and a
//! queued update that two newer frames have superseded is cancelled before
//! it ever starts. The remote message therefore converges on recent state
//! instead of replaying every intermediate frame, and a slow or failing
//! network can never stall the local bar.
//!
//! ```no_run
//! use barcast::{Meter, MeterConfig, TelegramConfig};
//!
//! let mut meter = Meter::with_telegram(
//!     MeterConfig {
//!         total: Some(100),
//!         ..MeterConfig::default()
//!     },
//!     TelegramConfig::default(), // token and chat id from the environment
//! );
//! for _ in 0..100 {
//!     // ... work ...
//!     meter.update(1);
//! }
//! meter.close();
//! ```
//!
//! Remote mirroring is strictly best effort: creation, edit, and delete
//! failures are logged locally and swallowed, and a sink whose initial
//! message could not be created degrades to a no-op for its lifetime.

/// Environment-backed configuration.
pub mod config;
/// Log-line routing above active bars.
pub mod logging;
/// The local progress meter.
pub mod meter;
/// Meter-to-sink lifecycle glue.
pub mod mirror;
/// Remote chat-backend sinks.
pub mod sink;
/// The stderr draw target.
pub mod term;
/// The bounded single-worker dispatcher.
pub mod worker;

pub use meter::{
    Meter, MeterConfig, MeterHooks, MeterIter, MeterIterExt, Snapshot, DEFAULT_MININTERVAL,
};
pub use mirror::{RemoteMirror, REMOTE_BAR_WIDTH, REMOTE_MININTERVAL};
pub use sink::discord::{DiscordBackend, DiscordConfig};
pub use sink::telegram::{TelegramBackend, TelegramConfig};
pub use sink::{Backend, MessageId, RemoteSink, SinkError};
pub use term::DrawTarget;
pub use worker::{MonoWorker, TaskHandle, TaskState, BACKLOG_LIMIT};

/// Sink mirroring to a Telegram chat.
pub type TelegramSink = RemoteSink<TelegramBackend>;
/// Sink mirroring to a Discord channel.
pub type DiscordSink = RemoteSink<DiscordBackend>;
