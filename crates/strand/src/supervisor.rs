use std::{cell::Cell, thread};

use strand_communication::Message;
use strand_timing::{Instant, Millis};
use strand_utils::{Label, LabelError, ThreadPriority, boot_thread};
use tracing::{Level, error, info, span, warn};

use crate::{
    WorkerError,
    logger::LOGGER_LABEL,
    registry::{RegistryError, ThreadState, registry},
    shutdown::shutdown_signalled,
};

const DEFAULT_QUEUE_CAPACITY: usize = 64;
const LOGGER_WAIT: Millis = Millis::from_secs(5);
const LOGGER_POLL: Millis = Millis(10);
const ESSENTIAL_BOOT_WAIT: Millis = Millis::from_secs(5);

thread_local! {
    static CURRENT: Cell<Option<Label>> = const { Cell::new(None) };
}

/// The registry label of the calling thread, if it runs under the
/// supervisor (or registered itself via [`register_current`]).
pub fn current_label() -> Option<Label> {
    CURRENT.with(Cell::get)
}

pub(crate) fn set_current_label(label: Label) {
    CURRENT.with(|c| c.set(Some(label)));
}

/// Immutable per-worker template. Cloned into the registry entry and the
/// worker's [`WorkerContext`].
#[derive(Clone, Debug)]
pub struct ThreadConfig {
    pub label: Label,
    /// Essential threads abort startup when they fail and ignore the
    /// suppression list.
    pub essential: bool,
    pub queue_capacity: usize,
    /// Pause between queue service rounds.
    pub interval: Millis,
    /// Budget for one [`service_queue`] batch.
    pub max_process_time: Millis,
    pub batch_size: usize,
    pub priority: ThreadPriority,
}

impl ThreadConfig {
    pub fn new(label: &str) -> Result<Self, LabelError> {
        Ok(Self::for_label(Label::new(label)?))
    }

    /// Like [`new`], for labels built at runtime (per-connection workers).
    ///
    /// [`new`]: ThreadConfig::new
    pub fn for_label(label: Label) -> Self {
        Self {
            label,
            essential: false,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            interval: Millis(10),
            max_process_time: Millis(100),
            batch_size: 16,
            priority: ThreadPriority::OsDefault,
        }
    }

    pub fn essential(mut self) -> Self {
        self.essential = true;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_priority(mut self, priority: ThreadPriority) -> Self {
        self.priority = priority;
        self
    }
}

/// What the supervisor hands a worker while it runs.
pub struct WorkerContext {
    pub config: ThreadConfig,
}

impl WorkerContext {
    pub fn label(&self) -> Label {
        self.config.label
    }

    /// Pops the next message from the worker's own queue.
    pub fn pop_own(&self, out: &mut Message, timeout: Millis) -> Result<(), RegistryError> {
        registry().pop_message(self.config.label, out, timeout)
    }

    /// Sleeps one service interval.
    pub fn idle(&self) {
        thread::sleep(self.config.interval.into());
    }
}

/// The hook capability set every supervised thread implements. All hooks
/// except [`run`] default to no-ops.
///
/// [`run`]: Worker::run
pub trait Worker: Send + 'static {
    /// Runs on the spawning thread, before the OS thread exists. May
    /// adjust the config.
    fn on_pre_create(&mut self, _cfg: &mut ThreadConfig) -> Result<(), WorkerError> {
        Ok(())
    }

    /// Runs first on the new thread, before registration.
    fn on_post_create(&mut self, _cfg: &ThreadConfig) -> Result<(), WorkerError> {
        Ok(())
    }

    /// Runs after the logger gate. A failure moves the thread to `Failed`
    /// without invoking [`run`].
    ///
    /// [`run`]: Worker::run
    fn on_init(&mut self, _cx: &WorkerContext) -> Result<(), WorkerError> {
        Ok(())
    }

    fn run(&mut self, cx: &WorkerContext) -> Result<(), WorkerError>;

    /// Runs after [`run`] regardless of its outcome. Errors are logged,
    /// never propagated.
    ///
    /// [`run`]: Worker::run
    fn on_exit(&mut self) -> Result<(), WorkerError> {
        Ok(())
    }

    /// Invoked by [`service_queue`] for each message drained from the
    /// worker's own queue.
    fn on_message(&mut self, _msg: &Message) -> Result<(), WorkerError> {
        Ok(())
    }
}

/// A worker paired with its config, ready for [`start_threads`].
pub struct WorkerSpec {
    pub worker: Box<dyn Worker>,
    pub config: ThreadConfig,
}

impl WorkerSpec {
    pub fn new(worker: impl Worker, config: ThreadConfig) -> Self {
        Self { worker: Box::new(worker), config }
    }
}

/// Spawns one supervised worker thread.
///
/// The calling side rejects duplicate labels, runs the pre-create hook and
/// hands the join handle to the registry; everything else happens in the
/// wrapper on the new thread.
pub fn spawn_worker(mut worker: Box<dyn Worker>, mut cfg: ThreadConfig) -> Result<(), WorkerError> {
    if registry().is_registered(cfg.label) {
        return Err(WorkerError::AlreadyExists(cfg.label));
    }
    worker.on_pre_create(&mut cfg)?;
    let label = cfg.label;
    let handle = thread::Builder::new()
        .name(label.to_string())
        .spawn(move || run_wrapper(worker, cfg))
        .map_err(|source| WorkerError::CreateFailed { label, source })?;
    registry().attach_handle(label, handle);
    Ok(())
}

// The uniform lifecycle around every worker body.
fn run_wrapper(mut worker: Box<dyn Worker>, cfg: ThreadConfig) {
    let label = cfg.label;
    set_current_label(label);
    boot_thread(cfg.priority);
    let _span = span!(Level::INFO, "", worker = %label).entered();

    if let Err(err) = worker.on_post_create(&cfg) {
        error!(%err, "post-create hook failed");
        return;
    }
    let reg = registry();
    if let Err(err) = reg.register(&cfg, true) {
        error!(%err, "registration failed");
        return;
    }
    // Registered from here on; every early return must reach deregister.
    let result = run_registered(worker.as_mut(), &cfg);

    if let Err(err) = worker.on_exit() {
        warn!(%err, "exit hook failed");
    }
    let terminal = match result {
        Ok(()) => ThreadState::Terminated,
        Err(err) => {
            error!(%err, "worker failed");
            ThreadState::Failed
        }
    };
    // Both of these hold by construction: the entry exists and
    // Running/Stopping always admit a terminal transition.
    if let Err(err) = reg.update_state(label, terminal) {
        strand_utils::safe_panic!("couldn't record terminal state: {err}");
    }
    if let Err(err) = reg.deregister(label) {
        strand_utils::safe_panic!("couldn't deregister: {err}");
    }
}

fn run_registered(worker: &mut dyn Worker, cfg: &ThreadConfig) -> Result<(), WorkerError> {
    let reg = registry();
    let label = cfg.label;
    reg.update_state(label, ThreadState::Running)?;
    reg.init_queue(label, cfg.queue_capacity)?;

    if label.as_str() != LOGGER_LABEL {
        wait_for_logger()?;
    }

    let cx = WorkerContext { config: cfg.clone() };
    worker.on_init(&cx)?;
    info!("worker running");

    let out = worker.run(&cx);
    // Record the wind-down before the terminal transition.
    let _ = reg.update_state(label, ThreadState::Stopping);
    out
}

// Every thread holds here until the logger drains log lines, so nothing
// initialises into a mute process.
fn wait_for_logger() -> Result<(), WorkerError> {
    let logger = Label::new(LOGGER_LABEL).expect("static label");
    let deadline = Instant::now() + LOGGER_WAIT;
    loop {
        if registry().get_state(logger) == ThreadState::Running {
            return Ok(());
        }
        if shutdown_signalled() || Instant::now() >= deadline {
            return Err(WorkerError::LoggerTimeout);
        }
        thread::sleep(LOGGER_POLL.into());
    }
}

/// Registers the calling thread (typically `main`) without supervision so
/// it shows up in the directory and may own a queue.
pub fn register_current(label: &str) -> Result<Label, WorkerError> {
    let cfg = ThreadConfig::new(label).map_err(|e| WorkerError::Config(e.to_string()))?;
    let reg = registry();
    reg.register(&cfg, false)?;
    reg.update_state(cfg.label, ThreadState::Running)?;
    reg.init_queue(cfg.label, cfg.queue_capacity)?;
    set_current_label(cfg.label);
    Ok(cfg.label)
}

/// Marks the calling thread finished and removes it from the directory.
pub fn deregister_current() {
    if let Some(label) = current_label() {
        let reg = registry();
        let _ = reg.update_state(label, ThreadState::Terminated);
        let _ = reg.deregister(label);
    }
}

/// Spawns a batch of workers, honoring the suppression list.
///
/// Non-essential workers whose label appears in `suppress` are skipped.
/// Essential workers ignore suppression (with a warning), are awaited
/// until `Running`, and abort startup if they fail to get there.
pub fn start_threads(specs: Vec<WorkerSpec>, suppress: &[String]) -> Result<(), WorkerError> {
    for spec in specs {
        let label = spec.config.label;
        let essential = spec.config.essential;
        let suppressed = suppress.iter().any(|s| label.matches(s));
        if suppressed {
            if essential {
                warn!(%label, "essential thread ignores the suppression list");
            } else {
                info!(%label, "thread suppressed by configuration");
                continue;
            }
        }
        match spawn_worker(spec.worker, spec.config) {
            Ok(()) if essential => wait_until_running(label)?,
            Ok(()) => {}
            Err(err) if essential => {
                error!(%label, %err, "essential thread failed to start");
                return Err(err);
            }
            Err(err) => {
                warn!(%label, %err, "non-essential thread failed to start, skipping");
            }
        }
    }
    Ok(())
}

fn wait_until_running(label: Label) -> Result<(), WorkerError> {
    let deadline = Instant::now() + ESSENTIAL_BOOT_WAIT;
    loop {
        match registry().get_state(label) {
            ThreadState::Running => return Ok(()),
            ThreadState::Failed | ThreadState::Terminated => {
                return Err(WorkerError::EssentialFailed(label));
            }
            _ if Instant::now() >= deadline => {
                return Err(WorkerError::EssentialFailed(label));
            }
            _ => thread::sleep(LOGGER_POLL.into()),
        }
    }
}

/// Drains the calling worker's queue in one bounded batch: at most
/// `batch_size` messages and `max_process_time` wall time, aborted on the
/// first processor error. Returns how many messages were handled.
pub fn service_queue<W: Worker + ?Sized>(
    worker: &mut W,
    cx: &WorkerContext,
) -> Result<usize, WorkerError> {
    let started = Instant::now();
    let mut processed = 0;
    let mut msg = Message::EMPTY;
    while processed < cx.config.batch_size && started.elapsed() < cx.config.max_process_time {
        match registry().pop_message(cx.config.label, &mut msg, Millis::ZERO) {
            Ok(()) => {
                worker.on_message(&msg)?;
                processed += 1;
            }
            Err(RegistryError::QueueEmpty(_)) => break,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(processed)
}
