// File: src/event_loop.rs
//
// Cooperative scheduler behind timers, events and promise callbacks.
//
// A single worker thread drains two sources of work: an unbounded queue of
// immediate tasks (always served first) and a min-heap of delayed tasks
// ordered by fire time. Named event handlers keep the loop alive while
// registered. When there is nothing queued, nothing scheduled and nothing
// listening, the worker exits.
//
// The worker parks on the shared tokio runtime only while waiting; tasks
// themselves run on the plain worker thread so they may block (`sleep`)
// without nesting runtimes.
//
// Lifecycle: Idle -> Running -> Stopped. Stopped is terminal.

use crate::errors::{ErrorKind, Panic};
use crate::interpreter::{AsyncRuntime, Object};
use ahash::AHashMap;
use parking_lot::Mutex;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Unit of deferred work. An `Err` is recorded like a panic.
pub type Task = Box<dyn FnOnce() -> Result<(), Panic> + Send + 'static>;

/// Event handler: receives the event name and the payload
pub type EventCallback = Arc<dyn Fn(&str, &[Object]) -> Result<(), Panic> + Send + Sync>;

/// Cancellation handle for an enqueued or scheduled task
#[derive(Clone)]
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
    wake: Option<Arc<Notify>>,
}

impl TaskHandle {
    fn new(wake: Arc<Notify>) -> Self {
        TaskHandle { cancelled: Arc::new(AtomicBool::new(false)), wake: Some(wake) }
    }

    /// Handle for work the loop refused (it was already stopped)
    fn noop() -> Self {
        TaskHandle { cancelled: Arc::new(AtomicBool::new(true)), wake: None }
    }

    /// Cancel the task. Never blocks; a task already running is unaffected.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(wake) = &self.wake {
            wake.notify_one();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Returned by handler registration; dropping it does not unregister
#[derive(Clone)]
pub struct Registration {
    event: String,
    id: u64,
    shared: Weak<Shared>,
}

impl Registration {
    /// Remove the handler. Calling this more than once is harmless.
    pub fn unregister(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.remove_handler(&self.event, self.id);
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopped,
}

struct ImmediateTask {
    cancelled: Arc<AtomicBool>,
    run: Task,
}

struct DelayedTask {
    at: Instant,
    seq: u64,
    cancelled: Arc<AtomicBool>,
    run: Task,
}

impl DelayedTask {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl PartialEq for DelayedTask {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for DelayedTask {}

impl PartialOrd for DelayedTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

// Reversed so the std max-heap pops the earliest task; ties go to the
// task scheduled first.
impl Ord for DelayedTask {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.at.cmp(&self.at).then_with(|| other.seq.cmp(&self.seq))
    }
}

struct EventHandler {
    id: u64,
    callback: EventCallback,
}

struct Shared {
    token: CancellationToken,
    sender: UnboundedSender<ImmediateTask>,
    receiver: Mutex<Option<UnboundedReceiver<ImmediateTask>>>,
    delayed: Mutex<BinaryHeap<DelayedTask>>,
    handlers: Mutex<AHashMap<String, Vec<EventHandler>>>,
    wake: Arc<Notify>,
    state: Mutex<LoopState>,
    stopped: AtomicBool,
    next_id: AtomicU64,
    last_panic: Mutex<Option<Panic>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

enum Wake {
    Cancelled,
    Task(Option<ImmediateTask>),
    Timer,
    Changed,
}

impl Shared {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn handler_count(&self) -> usize {
        self.handlers.lock().len()
    }

    fn remove_handler(&self, event: &str, id: u64) {
        {
            let mut handlers = self.handlers.lock();
            if let Some(list) = handlers.get_mut(event) {
                list.retain(|h| h.id != id);
                if list.is_empty() {
                    handlers.remove(event);
                }
            }
        }
        self.wake.notify_one();
    }

    /// Time until the earliest live delayed task; cancelled ones are dropped here
    fn next_delay(&self) -> Option<Duration> {
        let mut delayed = self.delayed.lock();
        while delayed.peek().is_some_and(DelayedTask::is_cancelled) {
            delayed.pop();
        }
        delayed.peek().map(|task| task.at.saturating_duration_since(Instant::now()))
    }

    /// Pop and run the earliest delayed task if it is due. Waking early is a no-op.
    fn run_due_task(&self) {
        let task = {
            let mut delayed = self.delayed.lock();
            match delayed.peek() {
                Some(task) if task.at <= Instant::now() => delayed.pop(),
                _ => None,
            }
        };
        if let Some(task) = task {
            if !task.is_cancelled() {
                self.execute(task.run);
            }
        }
    }

    fn execute_immediate(&self, task: ImmediateTask) {
        if task.cancelled.load(Ordering::Acquire) {
            return;
        }
        self.execute(task.run);
    }

    /// Run one task to completion, containing failures
    fn execute(&self, run: Task) {
        trace!("executing event loop task");
        let failure = match panic::catch_unwind(AssertUnwindSafe(run)) {
            Ok(Ok(())) => return,
            Ok(Err(failure)) => failure,
            Err(payload) => Panic::new(ErrorKind::EventLoop, panic_message(payload.as_ref())),
        };
        warn!(error = %failure, "event loop task failed");
        let mut last = self.last_panic.lock();
        if last.is_none() {
            *last = Some(failure);
        }
    }

    /// Run whatever is already queued, then refuse everything
    fn drain(&self, receiver: &mut UnboundedReceiver<ImmediateTask>) {
        self.stopped.store(true, Ordering::Release);
        while let Ok(task) = receiver.try_recv() {
            self.execute_immediate(task);
        }
    }

    /// Final transition; drops every pending task and handler so their
    /// captured values can be freed
    fn finish(&self) {
        self.stopped.store(true, Ordering::Release);
        *self.state.lock() = LoopState::Stopped;
        self.delayed.lock().clear();
        self.handlers.lock().clear();
        let receiver = self.receiver.lock().take();
        if let Some(mut receiver) = receiver {
            receiver.close();
            while receiver.try_recv().is_ok() {}
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}

fn run_loop(shared: Arc<Shared>, mut receiver: UnboundedReceiver<ImmediateTask>) {
    debug!("event loop started");
    loop {
        if shared.token.is_cancelled() {
            shared.drain(&mut receiver);
            break;
        }

        // Immediate work always goes first.
        if let Ok(task) = receiver.try_recv() {
            shared.execute_immediate(task);
            continue;
        }

        let next_delay = shared.next_delay();
        if next_delay.is_none() && shared.handler_count() == 0 {
            debug!("event loop has no remaining work");
            break;
        }

        let wake = AsyncRuntime::block_on(async {
            let timer = async {
                match next_delay {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                biased;
                _ = shared.token.cancelled() => Wake::Cancelled,
                task = receiver.recv() => Wake::Task(task),
                _ = timer => Wake::Timer,
                _ = shared.wake.notified() => Wake::Changed,
            }
        });

        match wake {
            Wake::Cancelled => {
                debug!("event loop cancelled, draining queued tasks");
                shared.drain(&mut receiver);
                break;
            }
            Wake::Task(Some(task)) => shared.execute_immediate(task),
            Wake::Task(None) => break,
            Wake::Timer => shared.run_due_task(),
            Wake::Changed => {}
        }
    }
    shared.finish();
    debug!("event loop stopped");
}

/// Handle to the scheduler; clones share the same loop
#[derive(Clone)]
pub struct EventLoop {
    shared: Arc<Shared>,
}

impl EventLoop {
    /// Create an idle loop. Cancelling `token` stops it.
    pub fn new(token: CancellationToken) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        EventLoop {
            shared: Arc::new(Shared {
                token,
                sender,
                receiver: Mutex::new(Some(receiver)),
                delayed: Mutex::new(BinaryHeap::new()),
                handlers: Mutex::new(AHashMap::new()),
                wake: Arc::new(Notify::new()),
                state: Mutex::new(LoopState::Idle),
                stopped: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                last_panic: Mutex::new(None),
                worker: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> LoopState {
        *self.shared.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == LoopState::Running
    }

    /// Queue a task to run as soon as the worker is free
    pub fn enqueue(&self, run: Task) -> TaskHandle {
        if self.shared.is_stopped() || self.shared.token.is_cancelled() {
            return TaskHandle::noop();
        }
        let handle = TaskHandle::new(self.shared.wake.clone());
        let task = ImmediateTask { cancelled: handle.cancelled.clone(), run };
        if self.shared.sender.send(task).is_err() {
            return TaskHandle::noop();
        }
        handle
    }

    /// Queue a task to run no earlier than `at`
    pub fn schedule(&self, run: Task, at: Instant) -> TaskHandle {
        if self.shared.is_stopped() || self.shared.token.is_cancelled() {
            return TaskHandle::noop();
        }
        let handle = TaskHandle::new(self.shared.wake.clone());
        let task = DelayedTask { at, seq: self.shared.next_id(), cancelled: handle.cancelled.clone(), run };
        self.shared.delayed.lock().push(task);
        self.shared.wake.notify_one();
        handle
    }

    /// Queue a task to run after `delay`
    pub fn schedule_after(&self, run: Task, delay: Duration) -> TaskHandle {
        self.schedule(run, Instant::now() + delay)
    }

    /// Add a handler for `event`. Handlers run in registration order.
    pub fn register_callback(&self, event: &str, callback: EventCallback) -> Registration {
        let id = self.shared.next_id();
        self.shared
            .handlers
            .lock()
            .entry(event.to_string())
            .or_default()
            .push(EventHandler { id, callback });
        self.shared.wake.notify_one();
        Registration { event: event.to_string(), id, shared: Arc::downgrade(&self.shared) }
    }

    /// Keep the loop alive until the returned registration is released
    pub fn register_lock(&self) -> Registration {
        let id = self.shared.next_id();
        let event = format!("__lock__{}", id);
        let inert: EventCallback = Arc::new(|_: &str, _: &[Object]| Ok(()));
        self.shared.handlers.lock().entry(event.clone()).or_default().push(EventHandler { id, callback: inert });
        self.shared.wake.notify_one();
        Registration { event, id, shared: Arc::downgrade(&self.shared) }
    }

    /// Deliver `args` to every handler of `event` from a queued task.
    ///
    /// Handlers are snapshotted when the task runs; the first failing handler
    /// stops delivery and becomes the task's failure.
    pub fn fire(&self, event: &str, args: Vec<Object>) -> TaskHandle {
        let shared = Arc::downgrade(&self.shared);
        let event = event.to_string();
        self.enqueue(Box::new(move || {
            let Some(shared) = shared.upgrade() else {
                return Ok(());
            };
            let callbacks: Vec<EventCallback> = shared
                .handlers
                .lock()
                .get(&event)
                .map(|list| list.iter().map(|h| h.callback.clone()).collect())
                .unwrap_or_default();
            trace!(event = %event, handlers = callbacks.len(), "firing event");
            for callback in callbacks {
                callback(event.as_str(), args.as_slice())?;
            }
            Ok(())
        }))
    }

    /// Spawn the worker. Only the first call on an idle loop has any effect.
    pub fn start(&self) -> Result<(), Panic> {
        {
            let mut state = self.shared.state.lock();
            if *state != LoopState::Idle {
                return Ok(());
            }
            *state = LoopState::Running;
        }
        let Some(receiver) = self.shared.receiver.lock().take() else {
            return Ok(());
        };
        let shared = self.shared.clone();
        let worker = std::thread::Builder::new()
            .name("refl-event-loop".to_string())
            .spawn(move || run_loop(shared, receiver))
            .map_err(|e| Panic::new(ErrorKind::EventLoop, format!("failed to start event loop: {}", e)))?;
        *self.shared.worker.lock() = Some(worker);
        Ok(())
    }

    /// Block until the worker exits. Returns immediately if it never started.
    pub fn wait(&self) {
        let worker = self.shared.worker.lock().take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                let mut last = self.shared.last_panic.lock();
                if last.is_none() {
                    *last = Some(Panic::new(ErrorKind::EventLoop, "event loop worker crashed"));
                }
            }
        }
    }

    /// Cancel the loop. A loop that never started is torn down on the spot.
    pub fn stop(&self) {
        self.shared.token.cancel();
        let was_idle = {
            let mut state = self.shared.state.lock();
            let idle = *state == LoopState::Idle;
            if idle {
                *state = LoopState::Stopped;
            }
            idle
        };
        if was_idle {
            self.shared.finish();
        }
    }

    /// First failure captured from a task, if any
    pub fn last_panic(&self) -> Option<Panic> {
        self.shared.last_panic.lock().clone()
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("state", &self.state())
            .field("handlers", &self.shared.handler_count())
            .field("delayed", &self.shared.delayed.lock().len())
            .finish()
    }
}
