//! Remote progress sinks: mirror local progress text onto one editable
//! message in a chat backend.
//!
//! A [`RemoteSink`] wraps a [`Backend`] (Telegram, Discord, or anything
//! implementing the trait) together with its own [`MonoWorker`], so every
//! network call runs off the caller's thread. Failures never reach the
//! caller: they are logged locally and the sink degrades to a no-op, because
//! remote mirroring must not be able to abort local iteration.

pub mod discord;
pub mod telegram;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::worker::{MonoWorker, TaskHandle};

/// Content substituted for an empty update.
pub const EMPTY_PLACEHOLDER: &str = "...";

/// Errors surfaced by remote sink operations.
#[derive(Debug, Error)]
pub enum SinkError {
    /// A destination or credential was neither passed explicitly nor found
    /// in the environment.
    #[error("missing configuration: {0}")]
    MissingConfig(&'static str),
    /// Error during network communication.
    #[error("network error: {0}")]
    Network(String),
    /// The backend rejected the request.
    #[error("API error: {0}")]
    Api(String),
    /// The backend answered with a body the sink could not interpret.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// The backend reported too many requests.
    #[error("rate limited: {0}")]
    RateLimited(String),
}

/// Identifier of the remote message a sink edits in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageId(String);

impl MessageId {
    /// Wrap a backend-issued identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier as issued by the backend.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One chat backend's create/edit/delete surface.
///
/// Implementations only build authenticated requests and interpret the
/// response envelope; scheduling, deduplication, and failure containment all
/// live in [`RemoteSink`].
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Sink type name, used as the initial placeholder message content.
    fn label(&self) -> &'static str;

    /// Post the initial message and return its identifier.
    async fn create(&self, text: &str) -> Result<MessageId, SinkError>;

    /// Replace the message content.
    async fn edit(&self, id: &MessageId, text: &str) -> Result<(), SinkError>;

    /// Delete the message.
    async fn delete(&self, id: &MessageId) -> Result<(), SinkError>;
}

/// Outcome of the constructor's single create attempt.
///
/// Written exactly once; `update`/`delete` branch on this instead of probing
/// for a maybe-set identifier.
#[derive(Debug, Clone)]
enum MessageRef {
    Unset,
    Set(MessageId),
    Failed,
}

/// Non-blocking mirror of progress text onto one remote message.
///
/// `update` takes `&mut self`, which statically enforces the single-writer
/// usage the dedup field relies on.
pub struct RemoteSink<B> {
    backend: Arc<B>,
    worker: Option<MonoWorker>,
    message: MessageRef,
    last_text: String,
    rate_warned: Arc<AtomicBool>,
}

impl<B: Backend> RemoteSink<B> {
    /// Create the sink and post the initial placeholder message.
    ///
    /// This is the one blocking call in the sink's lifetime: it waits for
    /// the create round-trip so the message identifier is known up front.
    /// Any failure (worker spawn, network, auth, a response without an
    /// identifier) is logged and leaves the sink inert; every later call
    /// is then a no-op and the local bar keeps working without a mirror.
    #[must_use]
    pub fn new(backend: B) -> Self {
        let backend = Arc::new(backend);
        let mut sink = Self {
            last_text: backend.label().to_string(),
            backend,
            worker: None,
            message: MessageRef::Unset,
            rate_warned: Arc::new(AtomicBool::new(false)),
        };
        let mut worker = match MonoWorker::spawn("barcast-sink") {
            Ok(worker) => worker,
            Err(e) => {
                warn!(error = %e, "could not spawn mirror worker; remote mirroring disabled");
                sink.message = MessageRef::Failed;
                return sink;
            }
        };
        sink.message = sink.request_create(&mut worker);
        sink.worker = Some(worker);
        sink
    }

    /// Submit the create call and wait for its outcome.
    fn request_create(&self, worker: &mut MonoWorker) -> MessageRef {
        let (tx, rx) = mpsc::channel();
        let backend = Arc::clone(&self.backend);
        let text = self.last_text.clone();
        let rate_warned = Arc::clone(&self.rate_warned);
        let _handle = worker.submit(async move {
            match backend.create(&text).await {
                Ok(id) => {
                    let _ = tx.send(Ok(id));
                    Ok(())
                }
                Err(e) => {
                    warn_rate_limit(&rate_warned, &e);
                    let _ = tx.send(Err(e.to_string()));
                    Err(e.into())
                }
            }
        });
        match rx.recv() {
            Ok(Ok(id)) => {
                debug!(id = %id, "remote progress message created");
                MessageRef::Set(id)
            }
            Ok(Err(msg)) => {
                warn!(error = %msg, "remote message creation failed; mirroring disabled");
                MessageRef::Failed
            }
            Err(_) => {
                warn!("mirror worker dropped the create request; mirroring disabled");
                MessageRef::Failed
            }
        }
    }

    /// Mirror `text` to the remote message.
    ///
    /// The text is normalized (carriage returns stripped, whitespace
    /// trimmed, empty mapped to [`EMPTY_PLACEHOLDER`]) and deduplicated
    /// against the last content handed to the dispatcher. Returns the
    /// handle of the dispatched edit, or `None` when the update was
    /// deduplicated or the sink is inert. Never blocks, never fails.
    pub fn update(&mut self, text: &str) -> Option<TaskHandle> {
        let text = normalize(text);
        if text == self.last_text {
            return None;
        }
        let MessageRef::Set(id) = &self.message else {
            return None;
        };
        let id = id.clone();
        // recorded before submission so a rapid follow-up call dedups
        // against the newest content, not the last delivered one
        self.last_text = text.clone();
        let backend = Arc::clone(&self.backend);
        let rate_warned = Arc::clone(&self.rate_warned);
        let worker = self.worker.as_mut()?;
        Some(worker.submit(async move {
            if let Err(e) = backend.edit(&id, &text).await {
                warn_rate_limit(&rate_warned, &e);
                return Err(e.into());
            }
            Ok(())
        }))
    }

    /// Delete the remote message.
    ///
    /// No-op without an established identifier; calling it twice submits
    /// two deletions, of which the second simply fails on its handle.
    pub fn delete(&mut self) -> Option<TaskHandle> {
        let MessageRef::Set(id) = &self.message else {
            return None;
        };
        let id = id.clone();
        let backend = Arc::clone(&self.backend);
        let rate_warned = Arc::clone(&self.rate_warned);
        let worker = self.worker.as_mut()?;
        Some(worker.submit(async move {
            if let Err(e) = backend.delete(&id).await {
                warn_rate_limit(&rate_warned, &e);
                return Err(e.into());
            }
            Ok(())
        }))
    }

    /// Identifier of the mirrored message, if creation succeeded.
    #[must_use]
    pub fn message_id(&self) -> Option<&MessageId> {
        match &self.message {
            MessageRef::Set(id) => Some(id),
            MessageRef::Unset | MessageRef::Failed => None,
        }
    }

    /// Last normalized content handed to the dispatcher.
    #[must_use]
    pub fn last_text(&self) -> &str {
        &self.last_text
    }
}

/// Warn once per sink when a backend starts rate limiting; afterwards the
/// mirror silently lags rather than failing.
fn warn_rate_limit(latch: &AtomicBool, error: &SinkError) {
    if matches!(error, SinkError::RateLimited(_)) && !latch.swap(true, Ordering::Relaxed) {
        warn!(%error, "remote backend is rate limiting updates; the mirror may lag");
    }
}

/// Normalize an update: drop carriage returns, trim whitespace, map empty
/// to the placeholder chat backends accept in place of blank content.
fn normalize(text: &str) -> String {
    let text = text.replace('\r', "");
    let text = text.trim();
    if text.is_empty() {
        EMPTY_PLACEHOLDER.to_string()
    } else {
        text.to_string()
    }
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((pos, _)) => &text[..pos],
        None => text,
    }
}

/// HTTP client shared by the backends, with the configured timeout.
pub(crate) fn http_client() -> reqwest::Client {
    let timeout = Duration::from_secs(crate::config::http_timeout_secs());
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard, PoisonError};

    #[derive(Debug, Default)]
    struct Calls {
        created: usize,
        edits: Vec<String>,
        deletes: usize,
    }

    #[derive(Debug, Default)]
    struct MockBackend {
        calls: Arc<Mutex<Calls>>,
        fail_create: bool,
        rate_limit_edits: bool,
    }

    impl MockBackend {
        fn recorder(&self) -> Arc<Mutex<Calls>> {
            Arc::clone(&self.calls)
        }
    }

    fn calls(recorder: &Mutex<Calls>) -> MutexGuard<'_, Calls> {
        recorder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[async_trait]
    impl Backend for MockBackend {
        fn label(&self) -> &'static str {
            "MockSink"
        }

        async fn create(&self, _text: &str) -> Result<MessageId, SinkError> {
            calls(&self.calls).created += 1;
            if self.fail_create {
                return Err(SinkError::MalformedResponse(
                    "response carried no identifier".to_string(),
                ));
            }
            Ok(MessageId::new("42"))
        }

        async fn edit(&self, _id: &MessageId, text: &str) -> Result<(), SinkError> {
            calls(&self.calls).edits.push(text.to_string());
            if self.rate_limit_edits {
                return Err(SinkError::RateLimited("slow down".to_string()));
            }
            Ok(())
        }

        async fn delete(&self, _id: &MessageId) -> Result<(), SinkError> {
            calls(&self.calls).deletes += 1;
            Ok(())
        }
    }

    fn settle(handle: Option<TaskHandle>) {
        if let Some(handle) = handle {
            let _ = handle.wait();
        }
    }

    #[test]
    fn update_dedups_repeated_content() {
        let backend = MockBackend::default();
        let recorder = backend.recorder();
        let mut sink = RemoteSink::new(backend);

        settle(sink.update("10%"));
        assert!(sink.update("10%").is_none());
        settle(sink.update("20%"));

        let calls = calls(&recorder);
        assert_eq!(calls.created, 1);
        assert_eq!(calls.edits, vec!["10%", "20%"]);
    }

    #[test]
    fn empty_and_whitespace_normalize_to_placeholder() {
        let backend = MockBackend::default();
        let recorder = backend.recorder();
        let mut sink = RemoteSink::new(backend);

        settle(sink.update(""));
        // whitespace and carriage returns collapse to the same placeholder
        assert!(sink.update("  \r ").is_none());

        assert_eq!(calls(&recorder).edits, vec![EMPTY_PLACEHOLDER]);
    }

    #[test]
    fn initial_label_is_preloaded_for_dedup() {
        let backend = MockBackend::default();
        let recorder = backend.recorder();
        let mut sink = RemoteSink::new(backend);

        // the placeholder message already shows the label
        assert!(sink.update("MockSink").is_none());
        assert!(calls(&recorder).edits.is_empty());
    }

    #[test]
    fn failed_create_makes_sink_inert() {
        let backend = MockBackend {
            fail_create: true,
            ..MockBackend::default()
        };
        let recorder = backend.recorder();
        let mut sink = RemoteSink::new(backend);

        assert!(sink.message_id().is_none());
        assert!(sink.update("10%").is_none());
        assert!(sink.update("20%").is_none());
        assert!(sink.delete().is_none());

        let calls = calls(&recorder);
        assert_eq!(calls.created, 1);
        assert!(calls.edits.is_empty());
        assert_eq!(calls.deletes, 0);
    }

    #[test]
    fn end_to_end_call_counts() {
        let backend = MockBackend::default();
        let recorder = backend.recorder();
        let mut sink = RemoteSink::new(backend);

        settle(sink.update("10%"));
        assert!(sink.update("10%").is_none());
        settle(sink.update("20%"));
        settle(sink.delete());

        let calls = calls(&recorder);
        assert_eq!(calls.edits.len(), 2);
        assert_eq!(calls.deletes, 1);
    }

    #[test]
    fn rate_limit_failure_stays_on_the_handle() {
        let backend = MockBackend {
            rate_limit_edits: true,
            ..MockBackend::default()
        };
        let mut sink = RemoteSink::new(backend);

        let handle = sink.update("10%");
        let Some(handle) = handle else {
            panic!("expected a dispatched edit");
        };
        match handle.wait() {
            crate::worker::TaskState::Failed(msg) => assert!(msg.contains("rate limited")),
            other => panic!("expected failure, got {other:?}"),
        }
        // the sink itself keeps operating in a degraded state
        assert!(sink.message_id().is_some());
    }

    #[test]
    fn normalization_table() {
        assert_eq!(normalize(""), EMPTY_PLACEHOLDER);
        assert_eq!(normalize("   "), EMPTY_PLACEHOLDER);
        assert_eq!(normalize("\r\r"), EMPTY_PLACEHOLDER);
        assert_eq!(normalize(" 50%|#####     | \r"), "50%|#####     |");
        assert_eq!(normalize("a\rb"), "ab");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("héllo", 2), "hé");
    }
}
