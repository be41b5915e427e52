use crate::command::{Command, CommandRef};
use crate::config::ExecutorConfig;
use crate::error::{CommandFailure, ExecutorError, FailureReason};
use crate::io::queue::CommandQueue;
use crate::state::{ExecutorState, Fetch, StateFlag, Transition};
use crate::utils::logger::Throttle;
use crate::utils::{HealthFlag, try_pin_core};
use arc_swap::ArcSwapOption;
use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::utils::CachePadded;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

/// Callback invoked on the worker thread for every failed command.
pub type FailureHook = dyn Fn(&CommandFailure) + Send + Sync;

/// Counters updated by the worker.
#[derive(Debug, Default)]
struct ExecutorStats {
    executed: CachePadded<AtomicU64>,
    failed: CachePadded<AtomicU64>,
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct StatsSnapshot {
    /// Commands whose `execute()` returned, successfully or not.
    pub executed: u64,
    /// Subset of `executed` that returned an error or panicked.
    pub failed: u64,
}

impl ExecutorStats {
    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            executed: self.executed.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
        }
    }
}

/// State shared between the executor handle and its worker thread.
struct WorkerShared {
    state: StateFlag,
    stats: ExecutorStats,
    on_failure: ArcSwapOption<Box<FailureHook>>,
    failure_log: Throttle,
    /// Set by the worker itself before it runs anything.
    worker_id: Mutex<Option<ThreadId>>,
    /// Whether the last worker unwound instead of returning.
    panicked: AtomicBool,
}

impl WorkerShared {
    fn new(failure_log_interval: Duration) -> Self {
        Self {
            state: StateFlag::new(ExecutorState::Stopped),
            stats: ExecutorStats::default(),
            on_failure: ArcSwapOption::empty(),
            failure_log: Throttle::new(failure_log_interval),
            worker_id: Mutex::new(None),
            panicked: AtomicBool::new(false),
        }
    }

    fn execute(&self, cmd: &dyn Command) {
        let outcome = catch_unwind(AssertUnwindSafe(|| cmd.execute()));
        self.stats.executed.fetch_add(1, Ordering::Release);

        let reason = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err)) => FailureReason::Error(err),
            Err(payload) => FailureReason::Panic(panic_message(payload.as_ref())),
        };
        self.stats.failed.fetch_add(1, Ordering::Release);

        let failure = CommandFailure {
            command: cmd.name().to_string(),
            reason,
        };
        match self.failure_log.poll() {
            Some(suppressed) => tracing::error!(suppressed, "[Executor] {}", failure),
            None => tracing::debug!("[Executor] {}", failure),
        }
        if let Some(hook) = self.on_failure.load_full() {
            let hook: &FailureHook = &**hook;
            if catch_unwind(AssertUnwindSafe(|| hook(&failure))).is_err() {
                tracing::error!("[Executor] failure hook panicked");
            }
        }
    }

    /// Report failures the throttle kept off the error level.
    fn flush_failure_log(&self) {
        let suppressed = self.failure_log.take_suppressed();
        if suppressed > 0 {
            tracing::error!(
                suppressed,
                "[Executor] {} more command failures logged at debug only",
                suppressed
            );
        }
    }
}

/// Handle of the current worker plus its exit signal.
///
/// The worker holds the matching sender and drops it as its last act, so a
/// receiver clone lets any number of joiners block until it is gone.
#[derive(Default)]
struct WorkerSlot {
    handle: Option<JoinHandle<()>>,
    exited: Option<Receiver<()>>,
}

/// Dropped at the end of the worker thread, on return or unwind.
struct ExitGuard {
    shared: Arc<WorkerShared>,
    alive: HealthFlag,
    _exited: Sender<()>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            self.shared.panicked.store(true, Ordering::Release);
            tracing::error!("[Executor] worker panicked");
        }
        self.alive.down();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Runs commands from a [`CommandQueue`] on one dedicated worker thread.
///
/// The current [`ExecutorState`] decides how the worker fetches: a blocking
/// pop while running, a draining non-blocking pop while soft-stopping. A
/// failing command is reported and skipped; it never stops the worker.
///
/// Dropping the executor performs a [`hard_stop`](Self::hard_stop).
pub struct Executor {
    queue: CommandQueue,
    cfg: ExecutorConfig,
    shared: Arc<WorkerShared>,
    /// Raised before spawn, lowered by the worker as it exits.
    alive: HealthFlag,
    worker: Mutex<WorkerSlot>,
}

impl Executor {
    /// Executor with the default config.
    pub fn new(queue: CommandQueue) -> Self {
        Self::build(queue, ExecutorConfig::default())
    }

    /// Executor with a custom config, validated here rather than on the worker.
    pub fn with_config(queue: CommandQueue, cfg: ExecutorConfig) -> Result<Self, ExecutorError> {
        cfg.validate()?;
        Ok(Self::build(queue, cfg))
    }

    /// Shorthand for an `Arc`-wrapped executor, which control commands need.
    pub fn new_arc(queue: CommandQueue) -> Arc<Self> {
        Arc::new(Self::new(queue))
    }

    fn build(queue: CommandQueue, cfg: ExecutorConfig) -> Self {
        let shared = Arc::new(WorkerShared::new(Duration::from_millis(
            cfg.failure_log_interval_ms,
        )));
        Self {
            queue,
            cfg,
            shared,
            alive: HealthFlag::new(false),
            worker: Mutex::new(WorkerSlot::default()),
        }
    }

    /// Spawn the worker. Fails with [`ExecutorError::AlreadyRunning`] if one is alive.
    pub fn start(&self) -> Result<(), ExecutorError> {
        let mut worker = self.worker.lock();
        if self.alive.get() {
            return Err(ExecutorError::AlreadyRunning);
        }
        // Reap a worker that finished on its own (drained soft stop).
        if let Some(finished) = worker.handle.take()
            && finished.join().is_err()
        {
            tracing::error!("[Executor] previous worker panicked");
        }

        self.shared.state.set(ExecutorState::Running);
        self.shared.panicked.store(false, Ordering::Release);
        self.alive.up();

        let (exited_tx, exited_rx) = channel::bounded(0);
        let guard = ExitGuard {
            shared: self.shared.clone(),
            alive: self.alive.clone(),
            _exited: exited_tx,
        };
        let queue = self.queue.clone();
        let core_id = self.cfg.core_id;

        let spawned = thread::Builder::new()
            .name(self.cfg.thread_name.clone())
            .spawn(move || run_worker(queue, guard, core_id));

        match spawned {
            Ok(handle) => {
                worker.handle = Some(handle);
                worker.exited = Some(exited_rx);
                tracing::info!("[Executor] started worker {}", self.cfg.thread_name);
                Ok(())
            }
            Err(e) => {
                self.alive.down();
                self.shared.state.set(ExecutorState::Stopped);
                Err(ExecutorError::Spawn(e))
            }
        }
    }

    /// Stop once the queue is drained. In-flight work is not interrupted.
    ///
    /// No-op unless the executor is running.
    pub fn soft_stop(&self) {
        if !self.is_running() {
            tracing::debug!("[Executor] soft stop ignored, not running");
            return;
        }
        match self.shared.state.apply(Transition::SoftStop) {
            Some(_) => {
                tracing::info!("[Executor] soft stop requested");
                self.queue.wake_all();
            }
            None => tracing::debug!(
                "[Executor] soft stop ignored in state {}",
                self.shared.state.get()
            ),
        }
    }

    /// Stop now: close the queue, discard whatever is still queued and join
    /// the worker.
    ///
    /// When called from the worker thread (e.g. by a queued hard-stop command)
    /// the join is skipped; the worker exits as soon as that command returns.
    /// Idempotent, and a no-op when the executor is not running.
    pub fn hard_stop(&self) {
        if !self.is_running() {
            tracing::debug!("[Executor] hard stop ignored, not running");
            return;
        }

        self.shared.state.apply(Transition::HardStop);
        self.queue.shutdown();
        let discarded = self.queue.clear();
        tracing::info!("[Executor] hard stop, discarded {} queued commands", discarded);

        if self.on_worker_thread() {
            return;
        }
        if let Err(e) = self.join() {
            tracing::error!("[Executor] join after hard stop failed: {}", e);
        }
    }

    /// Block until the worker thread has terminated. Returns at once if no
    /// worker was ever started.
    ///
    /// Concurrent joiners all wait, and all see [`ExecutorError::WorkerPanicked`]
    /// if the worker unwound.
    pub fn join(&self) -> Result<(), ExecutorError> {
        if self.on_worker_thread() {
            return Err(ExecutorError::JoinFromWorker);
        }

        let (handle, exited) = {
            let mut worker = self.worker.lock();
            (worker.handle.take(), worker.exited.clone())
        };
        match handle {
            Some(handle) => handle.join().map_err(|_| ExecutorError::WorkerPanicked),
            None => {
                // Another caller owns the handle. Disconnects once the worker's
                // guard is dropped.
                if let Some(exited) = exited {
                    let _ = exited.recv();
                }
                if self.shared.panicked.load(Ordering::Acquire) {
                    Err(ExecutorError::WorkerPanicked)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Replace the current state. Setting [`ExecutorState::Stopped`] ends the
    /// loop without closing the queue.
    pub fn set_state(&self, state: ExecutorState) {
        let prev = self.shared.state.set(state);
        self.queue.wake_all();
        tracing::debug!("[Executor] state {} -> {}", prev, state);
    }

    #[inline]
    pub fn state(&self) -> ExecutorState {
        self.shared.state.get()
    }

    #[inline]
    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// Whether a worker thread is alive.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.alive.get()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.cfg
    }

    /// Install (or replace) the failure hook. Takes effect for the next failure.
    pub fn on_failure(&self, hook: impl Fn(&CommandFailure) + Send + Sync + 'static) {
        self.shared
            .on_failure
            .store(Some(Arc::new(Box::new(hook) as Box<FailureHook>)));
    }

    /// Enqueue a command; shorthand for `queue().push(cmd)`.
    #[inline]
    pub fn submit(&self, cmd: CommandRef) -> bool {
        self.queue.push(cmd)
    }

    fn on_worker_thread(&self) -> bool {
        *self.shared.worker_id.lock() == Some(thread::current().id())
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.hard_stop();
    }
}

fn run_worker(queue: CommandQueue, guard: ExitGuard, core_id: Option<usize>) {
    let shared = &guard.shared;
    *shared.worker_id.lock() = Some(thread::current().id());

    if let Some(core_id) = core_id {
        match try_pin_core(core_id) {
            Ok(core_id) => tracing::info!("[Executor] pinned to core: {}", core_id),
            Err(e) => tracing::warn!("[Executor] cannot pin core: {}", e),
        }
    }

    loop {
        let state = shared.state.get();
        match state.fetch(&queue, &shared.state) {
            Fetch::Command(cmd) => shared.execute(cmd.as_ref()),
            Fetch::Retry => continue,
            Fetch::Exit => break,
        }
    }

    shared.flush_failure_log();
    tracing::info!("[Executor] worker exited in state {}", shared.state.get());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::command;
    use crate::io::queue::BlockingQueue;
    use std::io;

    /// In-memory sink for a scoped `tracing` subscriber.
    #[derive(Clone, Default)]
    struct LogBuf(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogBuf {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    fn capture(f: impl FnOnce()) -> String {
        let buf = LogBuf::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        buf.text()
    }

    fn failing(msg: &'static str) -> CommandRef {
        command(move || Err(anyhow::anyhow!(msg)))
    }

    #[test]
    fn back_to_back_failures_are_all_logged_by_default() {
        let shared = WorkerShared::new(Duration::from_millis(
            ExecutorConfig::default().failure_log_interval_ms,
        ));
        let logs = capture(|| {
            shared.execute(failing("first-boom").as_ref());
            shared.execute(failing("second-boom").as_ref());
        });

        assert_eq!(shared.stats.snapshot(), StatsSnapshot { executed: 2, failed: 2 });
        let errors: Vec<_> = logs.lines().filter(|l| l.contains("ERROR")).collect();
        assert!(errors.iter().any(|l| l.contains("first-boom")), "{logs}");
        assert!(errors.iter().any(|l| l.contains("second-boom")), "{logs}");
    }

    #[test]
    fn throttled_failures_still_reach_the_log() {
        let shared = WorkerShared::new(Duration::from_secs(3600));
        let logs = capture(|| {
            shared.execute(failing("first-boom").as_ref());
            shared.execute(failing("second-boom").as_ref());
            shared.execute(failing("third-boom").as_ref());
            shared.flush_failure_log();
        });

        assert!(logs.lines().any(|l| l.contains("ERROR") && l.contains("first-boom")), "{logs}");
        assert!(logs.lines().any(|l| l.contains("DEBUG") && l.contains("second-boom")), "{logs}");
        assert!(logs.lines().any(|l| l.contains("DEBUG") && l.contains("third-boom")), "{logs}");
        assert!(
            logs.lines()
                .any(|l| l.contains("ERROR") && l.contains("2 more command failures")),
            "{logs}"
        );
        assert_eq!(shared.failure_log.take_suppressed(), 0);
    }

    #[test]
    fn every_joiner_sees_a_worker_panic() {
        let exec = Executor::new(BlockingQueue::new());
        let (release_tx, release_rx) = channel::bounded::<()>(0);
        let (exited_tx, exited_rx) = channel::bounded(0);

        exec.alive.up();
        let guard = ExitGuard {
            shared: exec.shared.clone(),
            alive: exec.alive.clone(),
            _exited: exited_tx,
        };
        let handle = thread::spawn(move || {
            let _guard = guard;
            let _ = release_rx.recv();
            panic!("worker died");
        });
        *exec.worker.lock() = WorkerSlot {
            handle: Some(handle),
            exited: Some(exited_rx),
        };

        thread::scope(|s| {
            let joiners: Vec<_> = (0..2).map(|_| s.spawn(|| exec.join())).collect();
            thread::sleep(Duration::from_millis(20));
            drop(release_tx);
            for j in joiners {
                assert!(matches!(j.join().unwrap(), Err(ExecutorError::WorkerPanicked)));
            }
        });
        assert!(!exec.is_running());
        assert!(exec.shared.panicked.load(Ordering::Acquire));
    }

    #[test]
    fn restart_clears_a_previous_panic() {
        let exec = Executor::new(BlockingQueue::new());
        exec.shared.panicked.store(true, Ordering::Release);

        exec.start().unwrap();
        exec.soft_stop();
        exec.join().unwrap();
        assert!(!exec.shared.panicked.load(Ordering::Acquire));
    }
}
