//! End-to-end: meter lifecycle driving a remote sink through the mirror
//! hooks, with a mock backend standing in for the network.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use barcast::{
    Backend, Meter, MeterConfig, MeterHooks, MeterIterExt, MessageId, RemoteMirror, SinkError,
};

#[derive(Debug, Default)]
struct Calls {
    created: usize,
    edits: Vec<String>,
    deletes: usize,
}

/// Mock backend; when `gate` is set, every edit blocks the worker thread
/// until a token arrives, which lets a test hold the dispatcher busy.
struct MockBackend {
    calls: Arc<Mutex<Calls>>,
    gate: Option<Mutex<Receiver<()>>>,
}

impl MockBackend {
    fn new() -> (Self, Arc<Mutex<Calls>>) {
        let calls = Arc::new(Mutex::new(Calls::default()));
        (
            Self {
                calls: Arc::clone(&calls),
                gate: None,
            },
            calls,
        )
    }

    fn gated() -> (Self, Arc<Mutex<Calls>>, Sender<()>) {
        let (tx, rx) = channel();
        let (mut backend, calls) = Self::new();
        backend.gate = Some(Mutex::new(rx));
        (backend, calls, tx)
    }
}

fn lock<T>(value: &Mutex<T>) -> MutexGuard<'_, T> {
    value.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Backend for MockBackend {
    fn label(&self) -> &'static str {
        "MockSink"
    }

    async fn create(&self, _text: &str) -> Result<MessageId, SinkError> {
        lock(&self.calls).created += 1;
        Ok(MessageId::new("7"))
    }

    async fn edit(&self, _id: &MessageId, text: &str) -> Result<(), SinkError> {
        lock(&self.calls).edits.push(text.to_string());
        if let Some(gate) = &self.gate {
            let _ = lock(gate).recv();
        }
        Ok(())
    }

    async fn delete(&self, _id: &MessageId) -> Result<(), SinkError> {
        lock(&self.calls).deletes += 1;
        Ok(())
    }
}

fn mirrored_meter(config: MeterConfig, backend: MockBackend) -> Meter {
    let hooks: Vec<Box<dyn MeterHooks>> = vec![Box::new(RemoteMirror::new(backend))];
    Meter::with_hooks(config, hooks)
}

#[test]
fn finished_bar_is_mirrored_and_deleted_per_leave_policy() {
    let (backend, calls) = MockBackend::new();
    let config = MeterConfig {
        total: Some(3),
        mininterval: Some(Duration::ZERO),
        leave: Some(false),
        ..MeterConfig::default()
    };
    let mut meter = mirrored_meter(config, backend);

    for _ in 0..3 {
        meter.update(1);
    }
    meter.close();
    drop(meter); // joins the sink worker, draining queued calls

    let calls = lock(&calls);
    assert_eq!(calls.created, 1);
    let last = match calls.edits.last() {
        Some(last) => last,
        None => panic!("no edits were mirrored"),
    };
    assert!(last.contains("3/3"), "unexpected final frame: {last}");
    assert!(last.contains("100%"), "unexpected final frame: {last}");
    assert_eq!(calls.deletes, 1);
}

#[test]
fn outermost_bar_keeps_its_remote_message_by_default() {
    let (backend, calls) = MockBackend::new();
    let config = MeterConfig {
        total: Some(2),
        mininterval: Some(Duration::ZERO),
        ..MeterConfig::default()
    };
    let mut meter = mirrored_meter(config, backend);

    meter.update(2);
    meter.close();
    drop(meter);

    assert_eq!(lock(&calls).deletes, 0);
}

#[test]
fn iterator_adapter_drives_the_mirror_to_completion() {
    let (backend, calls) = MockBackend::new();
    let config = MeterConfig {
        total: Some(5),
        mininterval: Some(Duration::ZERO),
        bar_format: Some("{n}/{total}".to_string()),
        ..MeterConfig::default()
    };
    let meter = mirrored_meter(config, backend);

    let mut seen = 0;
    for _ in (0..5).progress_with(meter) {
        seen += 1;
    }

    assert_eq!(seen, 5);
    let calls = lock(&calls);
    assert_eq!(calls.edits.last().map(String::as_str), Some("5/5"));
    // position-0 bar with leave unset: the message remains
    assert_eq!(calls.deletes, 0);
}

#[test]
fn slow_network_never_blocks_updates_and_stale_frames_are_dropped() {
    let (backend, calls, gate) = MockBackend::gated();
    let config = MeterConfig {
        total: Some(30),
        mininterval: Some(Duration::ZERO),
        // frame text depends only on the count, so the eviction below is
        // observable as an exact hole in the delivered sequence
        bar_format: Some("{n}/{total}".to_string()),
        ..MeterConfig::default()
    };
    let mut meter = mirrored_meter(config, backend);

    // the constructor's zero frame is now blocking the worker inside edit()
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while lock(&calls).edits.len() < 1 {
        assert!(std::time::Instant::now() < deadline, "first edit never started");
        std::thread::sleep(Duration::from_millis(1));
    }

    meter.update(10);
    meter.update(10);
    meter.update(10);

    // all three updates returned while the worker was still stuck on the
    // zero frame; nothing else can have started
    assert_eq!(lock(&calls).edits.len(), 1);

    for _ in 0..8 {
        let _ = gate.send(());
    }
    drop(meter);

    let calls = lock(&calls);
    let edits: Vec<&str> = calls.edits.iter().map(String::as_str).collect();
    // 10/30 was queued behind 20/30 and 30/30 and evicted before it started
    assert_eq!(edits, vec!["0/30", "20/30", "30/30"]);
    assert_eq!(calls.deletes, 0);
}
