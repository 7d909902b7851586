//! Named background tasks with exactly-once delivery on the owning thread.
//!
//! Each `execute` runs its fetch on the blocking pool of a private Tokio
//! runtime. Workers never call back directly: they post a completion on a
//! channel, and the thread that owns the `TaskRunner` delivers it when it
//! calls [`TaskRunner::dispatch`] or [`TaskRunner::wait`]. That thread is
//! the only one that ever runs `on_success` / `on_error`, so callbacks may
//! capture `Rc` state freely.
//!
//! Starting a task under a name that is already running replaces it. The
//! replaced worker is never killed: its [`CancelToken`] is tripped, its
//! callbacks are dropped, and whatever it eventually returns is discarded.

use std::any::Any;
use std::collections::HashMap;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, SysdashError};

/// Cooperative cancellation flag handed to every fetch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Convenience for long enumerations: bail out with an error once the
    /// task has been replaced.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SysdashError::task_failed("task was cancelled"))
        } else {
            Ok(())
        }
    }
}

/// Lifecycle of one named task slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

type Payload = Box<dyn Any + Send>;
type Outcome = std::result::Result<Payload, String>;
type Deliver = Box<dyn FnOnce(Outcome)>;

struct Completion {
    name: String,
    generation: u64,
    outcome: Outcome,
}

struct TaskSlot {
    generation: u64,
    state: TaskState,
    cancel: CancelToken,
    handle: Option<JoinHandle<()>>,
    deliver: Option<Deliver>,
}

/// Runs blocking fetches off the owning thread.
pub struct TaskRunner {
    runtime: Runtime,
    slots: HashMap<String, TaskSlot>,
    next_generation: u64,
    join_replaced: bool,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
}

impl TaskRunner {
    /// Create a runner that detaches replaced workers
    pub fn new() -> Result<Self> {
        Self::with_join_replaced(false)
    }

    /// Create a runner; with `join_replaced` set, `execute` blocks until a
    /// replaced worker has returned before starting its successor.
    pub fn with_join_replaced(join_replaced: bool) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .thread_name("sysdash-worker")
            .build()?;

        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        Ok(Self {
            runtime,
            slots: HashMap::new(),
            next_generation: 0,
            join_replaced,
            completion_tx,
            completion_rx,
        })
    }

    /// Start `fetch` under `name`, replacing any running task of that name.
    ///
    /// Exactly one of `on_success` / `on_error` fires, during a later
    /// `dispatch` or `wait` on this thread, unless the task is itself
    /// replaced or stopped first, in which case neither fires.
    pub fn execute<T, E, F, S, R>(&mut self, name: &str, fetch: F, on_success: S, on_error: R)
    where
        T: Send + 'static,
        E: Display,
        F: FnOnce(&CancelToken) -> std::result::Result<T, E> + Send + 'static,
        S: FnOnce(T) + 'static,
        R: FnOnce(String) + 'static,
    {
        self.retire(name, TaskState::Cancelled);

        self.next_generation += 1;
        let generation = self.next_generation;
        let cancel = CancelToken::new();

        let worker_cancel = cancel.clone();
        let worker_tx = self.completion_tx.clone();
        let worker_name = name.to_string();
        let handle = self.runtime.spawn_blocking(move || {
            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| fetch(&worker_cancel))) {
                Ok(Ok(value)) => Ok(Box::new(value) as Payload),
                Ok(Err(e)) => Err(non_empty(e.to_string(), "fetch failed")),
                Err(panic_payload) => Err(panic_message(panic_payload)),
            };

            let completion = Completion {
                name: worker_name,
                generation,
                outcome,
            };
            if worker_tx.send(completion).is_err() {
                debug!("Task runner dropped before task finished");
            }
        });

        let deliver: Deliver = Box::new(move |outcome| match outcome {
            Ok(payload) => match payload.downcast::<T>() {
                Ok(value) => on_success(*value),
                Err(_) => on_error("task produced an unexpected result type".to_string()),
            },
            Err(message) => on_error(message),
        });

        debug!("Task '{}' started (generation {})", name, generation);

        self.slots.insert(
            name.to_string(),
            TaskSlot {
                generation,
                state: TaskState::Running,
                cancel,
                handle: Some(handle),
                deliver: Some(deliver),
            },
        );
    }

    /// Deliver every completion that has already arrived. Returns how many
    /// callbacks fired.
    pub fn dispatch(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(completion) = self.completion_rx.try_recv() {
            if self.deliver(completion) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Wait up to `timeout` for at least one completion, then deliver
    /// everything pending. Returns how many callbacks fired.
    pub fn dispatch_timeout(&mut self, timeout: Duration) -> usize {
        let first = {
            let rx = &mut self.completion_rx;
            self.runtime
                .block_on(async { tokio::time::timeout(timeout, rx.recv()).await })
        };

        let mut delivered = 0;
        if let Ok(Some(completion)) = first {
            if self.deliver(completion) {
                delivered += 1;
            }
        }
        delivered + self.dispatch()
    }

    /// Block until the task currently registered under `name` has delivered
    /// its outcome (or was never started). Other tasks' completions that
    /// arrive meanwhile are delivered too.
    pub fn wait(&mut self, name: &str) -> TaskState {
        while self.is_running(name) {
            match self.completion_rx.blocking_recv() {
                Some(completion) => {
                    self.deliver(completion);
                }
                None => {
                    error!("Completion channel closed while waiting for '{}'", name);
                    break;
                }
            }
        }
        self.state(name)
    }

    /// Cancel the running task under `name`; its callbacks never fire.
    pub fn stop(&mut self, name: &str) {
        self.retire(name, TaskState::Cancelled);
    }

    pub fn stop_all(&mut self) {
        let names: Vec<String> = self.slots.keys().cloned().collect();
        for name in names {
            self.stop(&name);
        }
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.state(name) == TaskState::Running
    }

    pub fn state(&self, name: &str) -> TaskState {
        self.slots
            .get(name)
            .map(|slot| slot.state)
            .unwrap_or(TaskState::Idle)
    }

    /// Names of tasks whose outcome has not been delivered yet
    pub fn running_tasks(&self) -> Vec<&str> {
        self.slots
            .iter()
            .filter(|(_, slot)| slot.state == TaskState::Running)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    fn retire(&mut self, name: &str, state: TaskState) {
        let Some(slot) = self.slots.get_mut(name) else {
            return;
        };
        if slot.state != TaskState::Running {
            return;
        }

        slot.cancel.cancel();
        slot.deliver = None;
        slot.state = state;
        let handle = slot.handle.take();
        debug!("Task '{}' generation {} replaced", name, slot.generation);

        if let (true, Some(handle)) = (self.join_replaced, handle) {
            if let Err(e) = self.runtime.block_on(handle) {
                warn!("Replaced task '{}' ended abnormally: {}", name, e);
            }
        }
    }

    fn deliver(&mut self, completion: Completion) -> bool {
        let deliver = match self.slots.get_mut(&completion.name) {
            Some(slot)
                if slot.generation == completion.generation
                    && slot.state == TaskState::Running =>
            {
                slot.state = if completion.outcome.is_ok() {
                    TaskState::Completed
                } else {
                    TaskState::Failed
                };
                slot.handle = None;
                slot.deliver.take()
            }
            _ => None,
        };

        match deliver {
            Some(deliver) => {
                debug!(
                    "Task '{}' generation {} finished",
                    completion.name, completion.generation
                );
                deliver(completion.outcome);
                true
            }
            None => {
                debug!(
                    "Discarding stale result of task '{}' generation {}",
                    completion.name, completion.generation
                );
                false
            }
        }
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        for slot in self.slots.values() {
            slot.cancel.cancel();
        }
    }
}

fn non_empty(message: String, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("fetch panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("fetch panicked: {}", s)
    } else {
        "fetch panicked".to_string()
    }
}
