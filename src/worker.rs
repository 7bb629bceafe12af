//! Bounded single-worker dispatcher for remote progress updates.
//!
//! A [`MonoWorker`] owns exactly one background thread for its whole
//! lifetime. Submitted futures are driven to completion on that thread
//! strictly one at a time, so tasks that start run in submission order and
//! never overlap. The backlog of outstanding handles is capped at
//! [`BACKLOG_LIMIT`]: when a newer submission would exceed the cap, the
//! oldest handle is evicted and, if its future has not begun executing,
//! cancelled, so a burst of updates converges on the newest content instead
//! of replaying every intermediate one.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

/// Maximum number of outstanding task handles tracked per worker.
pub const BACKLOG_LIMIT: usize = 2;

/// Lifecycle of one submitted unit of work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TaskState {
    /// Queued, not yet picked up by the worker thread.
    #[default]
    Pending,
    /// Currently executing on the worker thread.
    Running,
    /// Finished successfully.
    Done,
    /// Finished with an error message.
    Failed(String),
    /// Evicted from the backlog before execution; the future never ran.
    Cancelled,
}

impl TaskState {
    /// True once the task can no longer change state.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_) | Self::Cancelled)
    }
}

#[derive(Debug, Default)]
struct TaskShared {
    state: Mutex<TaskState>,
    settled: Condvar,
}

/// Handle to one submitted unit of work.
///
/// The dispatcher keeps a clone in its backlog until eviction; the submitter
/// may ignore the handle entirely (fire-and-forget) or [`wait`](Self::wait)
/// for settlement and inspect the outcome.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    shared: Arc<TaskShared>,
}

impl TaskHandle {
    fn new() -> Self {
        Self {
            shared: Arc::new(TaskShared::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TaskState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.lock().clone()
    }

    /// Block until the task settles and return its final state.
    #[must_use]
    pub fn wait(&self) -> TaskState {
        let mut guard = self.lock();
        while !guard.is_settled() {
            guard = self
                .shared
                .settled
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
        guard.clone()
    }

    /// Like [`wait`](Self::wait) with an upper bound; `None` on timeout.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> Option<TaskState> {
        let mut guard = self.lock();
        while !guard.is_settled() {
            let (next, result) = self
                .shared
                .settled
                .wait_timeout(guard, timeout)
                .unwrap_or_else(PoisonError::into_inner);
            guard = next;
            if result.timed_out() && !guard.is_settled() {
                return None;
            }
        }
        Some(guard.clone())
    }

    /// `Pending -> Cancelled`; only effective before the worker starts the
    /// job. Returns whether the transition happened.
    fn cancel(&self) -> bool {
        let mut guard = self.lock();
        if *guard == TaskState::Pending {
            *guard = TaskState::Cancelled;
            drop(guard);
            self.shared.settled.notify_all();
            true
        } else {
            false
        }
    }

    /// `Pending -> Running`, performed by the worker right before execution.
    /// Returns false for a handle cancelled while queued.
    fn begin(&self) -> bool {
        let mut guard = self.lock();
        if *guard == TaskState::Pending {
            *guard = TaskState::Running;
            true
        } else {
            false
        }
    }

    fn finish(&self, result: anyhow::Result<()>) {
        let mut guard = self.lock();
        *guard = match result {
            Ok(()) => TaskState::Done,
            Err(e) => TaskState::Failed(e.to_string()),
        };
        drop(guard);
        self.shared.settled.notify_all();
    }
}

struct Job {
    handle: TaskHandle,
    fut: Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>,
}

/// Single-threaded dispatcher with a bounded backlog.
#[derive(Debug)]
pub struct MonoWorker {
    tx: Option<mpsc::Sender<Job>>,
    backlog: VecDeque<TaskHandle>,
    thread: Option<thread::JoinHandle<()>>,
}

impl MonoWorker {
    /// Spawn the worker thread and its current-thread runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime or the thread cannot be created.
    pub fn spawn(name: &str) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (tx, rx) = mpsc::channel::<Job>();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || Self::run(&runtime, &rx))?;
        Ok(Self {
            tx: Some(tx),
            backlog: VecDeque::with_capacity(BACKLOG_LIMIT + 1),
            thread: Some(thread),
        })
    }

    fn run(runtime: &tokio::runtime::Runtime, rx: &mpsc::Receiver<Job>) {
        while let Ok(job) = rx.recv() {
            if !job.handle.begin() {
                // cancelled while queued; the future must not run
                continue;
            }
            let result = runtime.block_on(job.fut);
            job.handle.finish(result);
        }
    }

    /// Queue `fut` for execution on the worker thread.
    ///
    /// Never blocks. The handle is appended to the backlog; if the backlog
    /// now exceeds [`BACKLOG_LIMIT`], the oldest handle is evicted and
    /// cancelled unless it has already started. Errors raised by the future
    /// are recorded on the handle and nowhere else.
    pub fn submit<F>(&mut self, fut: F) -> TaskHandle
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handle = TaskHandle::new();
        let Some(tx) = &self.tx else {
            handle.finish(Err(anyhow::anyhow!("worker already shut down")));
            return handle;
        };
        let job = Job {
            handle: handle.clone(),
            fut: Box::pin(fut),
        };
        if tx.send(job).is_err() {
            // settle the handle so a waiter does not hang on a dead worker
            handle.finish(Err(anyhow::anyhow!("worker thread terminated")));
            return handle;
        }
        self.backlog.push_back(handle.clone());
        if self.backlog.len() > BACKLOG_LIMIT {
            if let Some(oldest) = self.backlog.pop_front() {
                if oldest.cancel() {
                    debug!("evicted a pending task superseded by newer submissions");
                }
            }
        }
        handle
    }

    /// Number of handles currently tracked in the backlog.
    #[must_use]
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }
}

impl Drop for MonoWorker {
    /// Closes the channel and joins the worker, draining still-queued
    /// uncancelled jobs. A deletion submitted during teardown therefore
    /// reaches the network before the program moves on.
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("dispatcher worker thread panicked during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::{channel, Sender};

    fn spawn_worker() -> MonoWorker {
        match MonoWorker::spawn("test-worker") {
            Ok(worker) => worker,
            Err(e) => panic!("failed to spawn worker: {e}"),
        }
    }

    fn push<T>(log: &Mutex<Vec<T>>, value: T) {
        log.lock().unwrap_or_else(PoisonError::into_inner).push(value);
    }

    fn entries<T: Clone>(log: &Mutex<Vec<T>>) -> Vec<T> {
        log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Occupies the worker thread until the returned sender is used.
    fn block_worker(worker: &mut MonoWorker) -> (Sender<()>, TaskHandle) {
        let (gate_tx, gate_rx) = channel::<()>();
        let handle = worker.submit(async move {
            let _ = gate_rx.recv();
            Ok(())
        });
        while handle.state() == TaskState::Pending {
            thread::yield_now();
        }
        (gate_tx, handle)
    }

    #[test]
    fn runs_submitted_task_to_done() {
        let mut worker = spawn_worker();
        let handle = worker.submit(async { Ok(()) });
        assert_eq!(handle.wait(), TaskState::Done);
    }

    #[test]
    fn failure_is_recorded_on_the_handle() {
        let mut worker = spawn_worker();
        let handle = worker.submit(async { anyhow::bail!("edit rejected") });
        match handle.wait() {
            TaskState::Failed(msg) => assert!(msg.contains("edit rejected")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn eviction_cancels_only_unstarted_tasks() {
        let mut worker = spawn_worker();
        let ran = Arc::new(Mutex::new(Vec::new()));
        let (gate, blocker) = block_worker(&mut worker);

        let record = |name: &'static str| {
            let ran = Arc::clone(&ran);
            async move {
                push(&ran, name);
                Ok(())
            }
        };
        let a = worker.submit(record("a"));
        let b = worker.submit(record("b")); // evicts the running blocker: left to finish
        let c = worker.submit(record("c")); // evicts a while still pending: cancelled

        assert_eq!(worker.backlog_len(), BACKLOG_LIMIT);
        assert_eq!(a.state(), TaskState::Cancelled);

        let _ = gate.send(());
        assert_eq!(blocker.wait(), TaskState::Done);
        assert_eq!(b.wait(), TaskState::Done);
        assert_eq!(c.wait(), TaskState::Done);
        assert_eq!(a.wait(), TaskState::Cancelled);
        // a's future never ran; survivors ran in submission order
        assert_eq!(entries(&ran), vec!["b", "c"]);
    }

    #[test]
    fn started_tasks_run_in_submission_order() {
        let mut worker = spawn_worker();
        let ran = Arc::new(Mutex::new(Vec::new()));
        let (gate, _blocker) = block_worker(&mut worker);

        let mut handles = Vec::new();
        for name in ["first", "second"] {
            let ran = Arc::clone(&ran);
            handles.push(worker.submit(async move {
                push(&ran, name);
                Ok(())
            }));
        }
        let _ = gate.send(());
        for handle in &handles {
            assert_eq!(handle.wait(), TaskState::Done);
        }
        assert_eq!(entries(&ran), vec!["first", "second"]);
    }

    #[test]
    fn wait_timeout_reports_unsettled_tasks() {
        let mut worker = spawn_worker();
        let (gate, handle) = block_worker(&mut worker);
        assert_eq!(handle.wait_timeout(Duration::from_millis(20)), None);
        let _ = gate.send(());
        assert_eq!(handle.wait(), TaskState::Done);
    }

    #[test]
    fn drop_drains_queued_work() {
        let mut worker = spawn_worker();
        let ran = Arc::new(Mutex::new(Vec::new()));
        let ran_clone = Arc::clone(&ran);
        let _ = worker.submit(async move {
            push(&ran_clone, "teardown");
            Ok(())
        });
        drop(worker);
        assert_eq!(entries(&ran), vec!["teardown"]);
    }
}
