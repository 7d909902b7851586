//! Validity-window cache in front of a fetch function.
//!
//! A [`CachedSource`] remembers the last snapshot of one data kind and the
//! instant its fetch started. Inside the validity window `get` answers
//! synchronously with the shared snapshot; outside it (or when forced) the
//! fetch is started on the [`TaskRunner`] and the answer arrives later,
//! through the caller's callback, on the owning thread.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::core::task_runner::{CancelToken, TaskRunner};
use crate::error::Result;

/// Source of "now" for validity checks.
pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

/// Last good snapshot and when the fetch that produced it started.
#[derive(Debug)]
pub struct CacheEntry<T> {
    pub snapshot: Arc<T>,
    pub fetched_at: Instant,
}

impl<T> CacheEntry<T> {
    pub fn is_fresh(&self, now: Instant, validity: Duration) -> bool {
        now.saturating_duration_since(self.fetched_at) < validity
    }
}

/// Immediate answer of [`CachedSource::get`].
#[derive(Debug)]
pub enum Fetch<T> {
    /// Cached snapshot inside its validity window
    Ready(Arc<T>),
    /// A fetch is in flight; the callback will fire on a later dispatch
    Pending,
}

impl<T> Fetch<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Fetch::Ready(_))
    }
}

/// A failed refresh. The cache keeps its previous snapshot, which is
/// handed back so the caller can keep showing it.
#[derive(Debug)]
pub struct FetchFailure<T> {
    pub message: String,
    pub stale: Option<Arc<T>>,
}

impl<T> Clone for FetchFailure<T> {
    fn clone(&self) -> Self {
        Self {
            message: self.message.clone(),
            stale: self.stale.clone(),
        }
    }
}

impl<T> fmt::Display for FetchFailure<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

pub type FetchResult<T> = std::result::Result<Arc<T>, FetchFailure<T>>;
pub type FetchFn<T> = Arc<dyn Fn(&CancelToken) -> Result<T> + Send + Sync>;

type Waiter<T> = Box<dyn FnOnce(FetchResult<T>)>;

/// Box a closure as a [`FetchFn`].
pub fn fetch_fn<T, F>(f: F) -> FetchFn<T>
where
    F: Fn(&CancelToken) -> Result<T> + Send + Sync + 'static,
{
    Arc::new(f)
}

struct SourceState<T> {
    entry: Option<CacheEntry<T>>,
    invalidated: bool,
    waiters: Vec<Waiter<T>>,
}

pub struct CachedSource<T> {
    task_name: String,
    validity: Duration,
    state: Rc<RefCell<SourceState<T>>>,
    fetch: FetchFn<T>,
    clock: Rc<dyn Clock>,
}

impl<T: Send + Sync + 'static> CachedSource<T> {
    pub fn new(
        task_name: impl Into<String>,
        validity: Duration,
        fetch: FetchFn<T>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        Self {
            task_name: task_name.into(),
            validity,
            state: Rc::new(RefCell::new(SourceState {
                entry: None,
                invalidated: false,
                waiters: Vec::new(),
            })),
            fetch,
            clock,
        }
    }

    /// Last good snapshot regardless of age
    pub fn peek(&self) -> Option<Arc<T>> {
        self.state
            .borrow()
            .entry
            .as_ref()
            .map(|entry| Arc::clone(&entry.snapshot))
    }

    /// Cached snapshot if it is still inside the validity window
    pub fn fresh(&self) -> Option<Arc<T>> {
        let state = self.state.borrow();
        if state.invalidated {
            return None;
        }
        let now = self.clock.now();
        state
            .entry
            .as_ref()
            .filter(|entry| entry.is_fresh(now, self.validity))
            .map(|entry| Arc::clone(&entry.snapshot))
    }

    /// Make the next non-forced `get` fetch again.
    pub fn invalidate(&self) {
        self.state.borrow_mut().invalidated = true;
    }

    pub fn is_pending(&self, runner: &TaskRunner) -> bool {
        runner.is_running(&self.task_name)
    }

    /// Return the cached snapshot, or start a refresh and answer through
    /// `on_done` once it finishes.
    ///
    /// A non-forced call made while a refresh is already in flight joins
    /// it instead of restarting it. A forced call always starts a new
    /// fetch, replacing the one in flight; callers already waiting get the
    /// new fetch's answer.
    pub fn get<F>(&self, runner: &mut TaskRunner, force_refresh: bool, on_done: F) -> Fetch<T>
    where
        F: FnOnce(FetchResult<T>) + 'static,
    {
        if !force_refresh {
            if let Some(snapshot) = self.fresh() {
                debug!("Cache hit for '{}'", self.task_name);
                return Fetch::Ready(snapshot);
            }
        }

        let in_flight = runner.is_running(&self.task_name);
        {
            let mut state = self.state.borrow_mut();
            if !in_flight {
                // Left behind by a fetch that was stopped before answering.
                state.waiters.clear();
            }
            state.waiters.push(Box::new(on_done));
        }

        if !force_refresh && in_flight {
            debug!("Joining in-flight fetch for '{}'", self.task_name);
            return Fetch::Pending;
        }

        self.start(runner);
        Fetch::Pending
    }

    /// Restart the fetch without adding a waiter. Callers already waiting
    /// get the new fetch's answer.
    pub fn refresh(&self, runner: &mut TaskRunner) {
        if !runner.is_running(&self.task_name) {
            self.state.borrow_mut().waiters.clear();
        }
        self.start(runner);
    }

    /// Cancel the fetch in flight and drop every waiter; none of them fire.
    pub fn stop(&self, runner: &mut TaskRunner) {
        runner.stop(&self.task_name);
        self.state.borrow_mut().waiters.clear();
    }

    /// Like [`get`](Self::get), but blocks the owning thread until the
    /// refresh is done. Other tasks' outcomes are delivered meanwhile.
    pub fn get_blocking(&self, runner: &mut TaskRunner, force_refresh: bool) -> FetchResult<T> {
        let slot: Rc<RefCell<Option<FetchResult<T>>>> = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&slot);

        if let Fetch::Ready(snapshot) = self.get(runner, force_refresh, move |result| {
            *sink.borrow_mut() = Some(result);
        }) {
            return Ok(snapshot);
        }

        while slot.borrow().is_none() && runner.is_running(&self.task_name) {
            runner.wait(&self.task_name);
        }

        let outcome = slot.borrow_mut().take();
        outcome.unwrap_or_else(|| {
            Err(FetchFailure {
                message: format!("fetch '{}' was cancelled", self.task_name),
                stale: self.peek(),
            })
        })
    }

    fn start(&self, runner: &mut TaskRunner) {
        let started_at = self.clock.now();
        let fetch = Arc::clone(&self.fetch);
        let on_ok = Rc::clone(&self.state);
        let on_err = Rc::clone(&self.state);
        let name_ok = self.task_name.clone();
        let name_err = self.task_name.clone();

        debug!("Cache miss for '{}', fetching", self.task_name);

        runner.execute(
            &self.task_name,
            move |cancel| fetch(cancel),
            move |value: T| {
                let snapshot = Arc::new(value);
                let waiters = {
                    let mut state = on_ok.borrow_mut();
                    state.entry = Some(CacheEntry {
                        snapshot: Arc::clone(&snapshot),
                        fetched_at: started_at,
                    });
                    state.invalidated = false;
                    std::mem::take(&mut state.waiters)
                };
                debug!("'{}' refreshed, {} waiter(s)", name_ok, waiters.len());
                for waiter in waiters {
                    waiter(Ok(Arc::clone(&snapshot)));
                }
            },
            move |message| {
                let (waiters, stale) = {
                    let mut state = on_err.borrow_mut();
                    let stale = state.entry.as_ref().map(|e| Arc::clone(&e.snapshot));
                    (std::mem::take(&mut state.waiters), stale)
                };
                warn!("Refreshing '{}' failed: {}", name_err, message);
                let failure = FetchFailure { message, stale };
                for waiter in waiters {
                    waiter(Err(failure.clone()));
                }
            },
        );
    }
}
