//! The coordinator the presentation layer talks to.
//!
//! `MonitorHub` owns the task runner, one cache per cached data kind, the
//! providers and the periodic samplers. Everything it produces reaches
//! subscribers as [`HubEvent`]s, delivered on the thread that owns the hub
//! when it calls [`MonitorHub::dispatch`] (or one of the `run` loops).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};
use parking_lot::Mutex;
use serde::Serialize;

use crate::core::cache::{fetch_fn, CachedSource, Clock, Fetch, FetchResult, SystemClock};
use crate::core::config::MonitorConfig;
use crate::core::system_monitor::{
    self, HardwareInventory, HardwareProvider, KillOutcome, NetworkConnection, ProcessDetails,
    ProcessProvider, ProcessRecord, ProcessTraffic, SensorProvider, SensorReport, ServiceEntry,
    SystemDetails, SystemProvider, SystemSnapshot, TrafficMonitor, TrafficSample,
};
use crate::core::task_runner::{TaskRunner, TaskState};
use crate::error::{Result, SysdashError};

/// Longest a run loop sleeps before re-checking its stop condition
const MAX_IDLE_WAIT: Duration = Duration::from_millis(100);

/// Data kinds, one background task name each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    System,
    Processes,
    Connections,
    Traffic,
    ProcessTraffic,
    Hardware,
    Sensors,
    Services,
    Details,
}

impl DataKind {
    pub fn task_name(self) -> &'static str {
        match self {
            DataKind::System => "system",
            DataKind::Processes => "processes",
            DataKind::Connections => "connections",
            DataKind::Traffic => "traffic",
            DataKind::ProcessTraffic => "process_traffic",
            DataKind::Hardware => "hardware",
            DataKind::Sensors => "sensors",
            DataKind::Services => "services",
            DataKind::Details => "details",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.task_name())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum HubEvent {
    System(Arc<SystemSnapshot>),
    Processes(Arc<Vec<ProcessRecord>>),
    Connections(Arc<Vec<NetworkConnection>>),
    Traffic(Arc<TrafficSample>),
    ProcessTraffic(Arc<Vec<ProcessTraffic>>),
    Hardware(Arc<HardwareInventory>),
    Sensors(Arc<SensorReport>),
    Services(Arc<Vec<ServiceEntry>>),
    Details(Arc<SystemDetails>),
    ProcessKilled { pid: u32, message: String },
    Error { source: DataKind, message: String },
}

type Listener = Box<dyn FnMut(&HubEvent)>;

/// Subscribers, called in subscription order.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Rc<RefCell<Vec<Listener>>>,
}

impl EventBus {
    pub fn subscribe<F>(&self, listener: F)
    where
        F: FnMut(&HubEvent) + 'static,
    {
        self.listeners.borrow_mut().push(Box::new(listener));
    }

    pub fn emit(&self, event: &HubEvent) {
        // Listeners may subscribe others while being called.
        let mut active = std::mem::take(&mut *self.listeners.borrow_mut());
        for listener in active.iter_mut() {
            listener(event);
        }
        let mut listeners = self.listeners.borrow_mut();
        active.append(&mut listeners);
        *listeners = active;
    }

    fn emit_result<T>(&self, kind: DataKind, result: FetchResult<T>, wrap: fn(Arc<T>) -> HubEvent) {
        match result {
            Ok(snapshot) => self.emit(&wrap(snapshot)),
            Err(failure) => self.emit(&HubEvent::Error {
                source: kind,
                message: failure.message,
            }),
        }
    }
}

/// Fixed-interval schedule driven by [`MonitorHub::poll`].
#[derive(Debug, Clone)]
struct Ticker {
    interval: Duration,
    next_due: Option<Instant>,
}

impl Ticker {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    fn start(&mut self, now: Instant) {
        self.next_due = Some(now);
    }

    fn stop(&mut self) {
        self.next_due = None;
    }

    fn set_interval(&mut self, interval: Duration, now: Instant) {
        self.interval = interval;
        if self.next_due.is_some() {
            self.next_due = Some(now + interval);
        }
    }

    /// True once per elapsed interval
    fn take_due(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(due) if now >= due => {
                self.next_due = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }

    fn time_until_due(&self, now: Instant) -> Option<Duration> {
        self.next_due.map(|due| due.saturating_duration_since(now))
    }
}

pub struct MonitorHub {
    config: MonitorConfig,
    clock: Rc<dyn Clock>,
    runner: TaskRunner,
    bus: EventBus,
    monitoring: bool,
    system_ticker: Ticker,
    traffic_ticker: Ticker,
    system: Arc<Mutex<SystemProvider>>,
    traffic: Arc<Mutex<TrafficMonitor>>,
    sensors: Arc<Mutex<SensorProvider>>,
    processes: CachedSource<Vec<ProcessRecord>>,
    connections: CachedSource<Vec<NetworkConnection>>,
    process_traffic: CachedSource<Vec<ProcessTraffic>>,
    hardware: CachedSource<HardwareInventory>,
    details: CachedSource<SystemDetails>,
}

impl MonitorHub {
    pub fn new(config: MonitorConfig) -> Result<Self> {
        Self::with_clock(config, Rc::new(SystemClock))
    }

    pub fn with_clock(config: MonitorConfig, clock: Rc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let runner = TaskRunner::with_join_replaced(config.join_replaced)?;

        let process_provider = Arc::new(Mutex::new(ProcessProvider::new()));
        let hardware_provider = Arc::new(Mutex::new(HardwareProvider::new()));

        let processes = {
            let provider = Arc::clone(&process_provider);
            let cap = config.max_processes;
            CachedSource::new(
                DataKind::Processes.task_name(),
                config.process_cache(),
                fetch_fn(move |cancel| provider.lock().list(cap, cancel)),
                Rc::clone(&clock),
            )
        };

        let connections = {
            let cap = config.max_connections;
            CachedSource::new(
                DataKind::Connections.task_name(),
                config.connection_cache(),
                fetch_fn(move |cancel| system_monitor::list_connections(cap, cancel)),
                Rc::clone(&clock),
            )
        };

        let process_traffic = {
            let provider = Arc::clone(&process_provider);
            let cap = config.max_connections;
            CachedSource::new(
                DataKind::ProcessTraffic.task_name(),
                config.process_traffic_cache(),
                fetch_fn(move |cancel| {
                    let connections = system_monitor::list_connections(cap, cancel)?;
                    cancel.check()?;
                    Ok(provider.lock().traffic(&connections))
                }),
                Rc::clone(&clock),
            )
        };

        let hardware = {
            let provider = Arc::clone(&hardware_provider);
            CachedSource::new(
                DataKind::Hardware.task_name(),
                config.hardware_cache(),
                fetch_fn(move |cancel| provider.lock().collect(cancel)),
                Rc::clone(&clock),
            )
        };

        let details = CachedSource::new(
            DataKind::Details.task_name(),
            config.details_cache(),
            fetch_fn(|_| system_monitor::collect_details()),
            Rc::clone(&clock),
        );

        Ok(Self {
            system_ticker: Ticker::new(config.system_interval()),
            traffic_ticker: Ticker::new(config.traffic_interval()),
            config,
            clock,
            runner,
            bus: EventBus::default(),
            monitoring: false,
            system: Arc::new(Mutex::new(SystemProvider::new())),
            traffic: Arc::new(Mutex::new(TrafficMonitor::new())),
            sensors: Arc::new(Mutex::new(SensorProvider::new())),
            processes,
            connections,
            process_traffic,
            hardware,
            details,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn subscribe<F>(&self, listener: F)
    where
        F: FnMut(&HubEvent) + 'static,
    {
        self.bus.subscribe(listener);
    }

    // Periodic sampling

    /// Start the system and traffic samplers; the first samples are due
    /// on the next `poll`.
    pub fn start_monitoring(&mut self) {
        if self.monitoring {
            return;
        }
        let now = self.clock.now();
        self.system_ticker.start(now);
        self.traffic_ticker.start(now);
        self.monitoring = true;
        info!(
            "Monitoring started (system every {:?}, traffic every {:?})",
            self.system_ticker.interval, self.traffic_ticker.interval
        );
    }

    /// Stop both samplers. Samples still in flight are discarded.
    pub fn stop_monitoring(&mut self) {
        if !self.monitoring {
            return;
        }
        self.monitoring = false;
        self.system_ticker.stop();
        self.traffic_ticker.stop();
        self.runner.stop(DataKind::System.task_name());
        self.runner.stop(DataKind::Traffic.task_name());
        info!("Monitoring stopped");
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring
    }

    /// Change the system sampling interval, effective immediately.
    pub fn set_update_interval(&mut self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(SysdashError::config("update interval must be greater than 0"));
        }
        self.config.system_interval_ms = interval.as_millis().try_into().unwrap_or(u64::MAX);
        let now = self.clock.now();
        self.system_ticker.set_interval(interval, now);
        Ok(())
    }

    /// Launch every periodic sample that is due. A sample whose previous
    /// run is still in flight is skipped for this tick. Returns how many
    /// samples were started.
    pub fn poll(&mut self) -> usize {
        if !self.monitoring {
            return 0;
        }
        let now = self.clock.now();
        let mut started = 0;

        if self.system_ticker.take_due(now) {
            if self.runner.is_running(DataKind::System.task_name()) {
                debug!("System sample still running, skipping tick");
            } else {
                self.sample_system();
                started += 1;
            }
        }

        if self.traffic_ticker.take_due(now) {
            if self.runner.is_running(DataKind::Traffic.task_name()) {
                debug!("Traffic sample still running, skipping tick");
            } else {
                self.sample_traffic();
                started += 1;
            }
        }

        started
    }

    fn sample_system(&mut self) {
        let provider = Arc::clone(&self.system);
        let ok = self.bus.clone();
        let err = self.bus.clone();
        self.runner.execute(
            DataKind::System.task_name(),
            move |_| provider.lock().sample(),
            move |snapshot| ok.emit(&HubEvent::System(Arc::new(snapshot))),
            move |message| {
                err.emit(&HubEvent::Error {
                    source: DataKind::System,
                    message,
                })
            },
        );
    }

    fn sample_traffic(&mut self) {
        let monitor = Arc::clone(&self.traffic);
        let ok = self.bus.clone();
        let err = self.bus.clone();
        self.runner.execute(
            DataKind::Traffic.task_name(),
            move |_| monitor.lock().sample(),
            move |sample| ok.emit(&HubEvent::Traffic(Arc::new(sample))),
            move |message| {
                err.emit(&HubEvent::Error {
                    source: DataKind::Traffic,
                    message,
                })
            },
        );
    }

    // Cached sources

    pub fn processes(&mut self, force_refresh: bool) -> Fetch<Vec<ProcessRecord>> {
        request(
            &self.processes,
            &mut self.runner,
            &self.bus,
            DataKind::Processes,
            force_refresh,
            HubEvent::Processes,
        )
    }

    pub fn connections(&mut self, force_refresh: bool) -> Fetch<Vec<NetworkConnection>> {
        request(
            &self.connections,
            &mut self.runner,
            &self.bus,
            DataKind::Connections,
            force_refresh,
            HubEvent::Connections,
        )
    }

    pub fn process_traffic(&mut self, force_refresh: bool) -> Fetch<Vec<ProcessTraffic>> {
        request(
            &self.process_traffic,
            &mut self.runner,
            &self.bus,
            DataKind::ProcessTraffic,
            force_refresh,
            HubEvent::ProcessTraffic,
        )
    }

    pub fn hardware(&mut self, force_refresh: bool) -> Fetch<HardwareInventory> {
        request(
            &self.hardware,
            &mut self.runner,
            &self.bus,
            DataKind::Hardware,
            force_refresh,
            HubEvent::Hardware,
        )
    }

    pub fn details(&mut self, force_refresh: bool) -> Fetch<SystemDetails> {
        request(
            &self.details,
            &mut self.runner,
            &self.bus,
            DataKind::Details,
            force_refresh,
            HubEvent::Details,
        )
    }

    /// Process list for callers that cannot continue without it.
    pub fn processes_blocking(&mut self, force_refresh: bool) -> FetchResult<Vec<ProcessRecord>> {
        self.processes.get_blocking(&mut self.runner, force_refresh)
    }

    pub fn hardware_blocking(&mut self, force_refresh: bool) -> FetchResult<HardwareInventory> {
        self.hardware.get_blocking(&mut self.runner, force_refresh)
    }

    // Uncached sources

    pub fn sensors(&mut self) {
        let provider = Arc::clone(&self.sensors);
        let ok = self.bus.clone();
        let err = self.bus.clone();
        self.runner.execute(
            DataKind::Sensors.task_name(),
            move |_| provider.lock().collect(),
            move |report: SensorReport| ok.emit(&HubEvent::Sensors(Arc::new(report))),
            move |message| {
                err.emit(&HubEvent::Error {
                    source: DataKind::Sensors,
                    message,
                })
            },
        );
    }

    pub fn services(&mut self) {
        let cap = self.config.max_services;
        let ok = self.bus.clone();
        let err = self.bus.clone();
        self.runner.execute(
            DataKind::Services.task_name(),
            move |_| system_monitor::list_services(cap),
            move |services| ok.emit(&HubEvent::Services(Arc::new(services))),
            move |message| {
                err.emit(&HubEvent::Error {
                    source: DataKind::Services,
                    message,
                })
            },
        );
    }

    // Process management

    /// Terminate (or with `force`, kill) a process. On success the process
    /// cache is invalidated so the next list reflects the change.
    pub fn kill_process(&mut self, pid: u32, force: bool) -> KillOutcome {
        let outcome = system_monitor::kill_process(pid, force);
        if outcome.success {
            self.processes.invalidate();
            self.bus.emit(&HubEvent::ProcessKilled {
                pid,
                message: outcome.message.clone(),
            });
        } else {
            self.bus.emit(&HubEvent::Error {
                source: DataKind::Processes,
                message: outcome.message.clone(),
            });
        }
        outcome
    }

    pub fn process_details(&self, pid: u32) -> Result<ProcessDetails> {
        system_monitor::process_details(pid)
    }

    // Event loop

    /// Deliver every finished fetch. Returns how many outcomes fired.
    pub fn dispatch(&mut self) -> usize {
        self.runner.dispatch()
    }

    /// Block until the running fetch of `kind` has delivered its outcome.
    pub fn wait(&mut self, kind: DataKind) -> TaskState {
        self.runner.wait(kind.task_name())
    }

    pub fn is_pending(&self, kind: DataKind) -> bool {
        self.runner.is_running(kind.task_name())
    }

    /// Poll and dispatch until `deadline`.
    pub fn run_until(&mut self, deadline: Instant) {
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            self.step(deadline - now);
        }
    }

    /// Poll and dispatch until `shutdown` is set.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        while !shutdown.load(Ordering::Relaxed) {
            self.step(MAX_IDLE_WAIT);
        }
        self.shutdown();
    }

    /// Cancel everything in flight; callbacks of cancelled work never fire.
    pub fn shutdown(&mut self) {
        self.stop_monitoring();
        self.processes.stop(&mut self.runner);
        self.connections.stop(&mut self.runner);
        self.process_traffic.stop(&mut self.runner);
        self.hardware.stop(&mut self.runner);
        self.details.stop(&mut self.runner);
        self.runner.stop_all();
    }

    fn step(&mut self, max_wait: Duration) {
        self.poll();

        let now = self.clock.now();
        let wait = [
            self.system_ticker.time_until_due(now),
            self.traffic_ticker.time_until_due(now),
        ]
        .into_iter()
        .flatten()
        .fold(max_wait.min(MAX_IDLE_WAIT), Duration::min);

        self.runner.dispatch_timeout(wait.max(Duration::from_millis(1)));
    }
}

impl Drop for MonitorHub {
    fn drop(&mut self) {
        self.runner.stop_all();
    }
}

/// Serve `source` from cache or start a refresh whose outcome becomes a
/// hub event. A request while a refresh is running joins it (or, forced,
/// restarts it) without queueing a second event.
fn request<T: Send + Sync + 'static>(
    source: &CachedSource<T>,
    runner: &mut TaskRunner,
    bus: &EventBus,
    kind: DataKind,
    force_refresh: bool,
    wrap: fn(Arc<T>) -> HubEvent,
) -> Fetch<T> {
    if source.is_pending(runner) {
        if force_refresh {
            source.refresh(runner);
        }
        return Fetch::Pending;
    }
    let bus = bus.clone();
    source.get(runner, force_refresh, move |result| {
        bus.emit_result(kind, result, wrap)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::ManualClock;

    #[test]
    fn test_ticker_fires_once_per_interval() {
        let start = Instant::now();
        let mut ticker = Ticker::new(Duration::from_secs(2));
        assert!(!ticker.take_due(start));

        ticker.start(start);
        assert!(ticker.take_due(start));
        assert!(!ticker.take_due(start + Duration::from_secs(1)));
        assert!(ticker.take_due(start + Duration::from_secs(2)));

        ticker.stop();
        assert!(!ticker.take_due(start + Duration::from_secs(10)));
    }

    #[test]
    fn test_ticker_interval_change_reschedules() {
        let start = Instant::now();
        let mut ticker = Ticker::new(Duration::from_secs(10));
        ticker.start(start);
        ticker.take_due(start);

        ticker.set_interval(Duration::from_secs(1), start);
        assert_eq!(ticker.time_until_due(start), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_event_bus_allows_subscribe_during_emit() {
        let bus = EventBus::default();
        let seen = Rc::new(RefCell::new(0));

        let inner_bus = bus.clone();
        let inner_seen = Rc::clone(&seen);
        bus.subscribe(move |_| {
            let seen = Rc::clone(&inner_seen);
            inner_bus.subscribe(move |_| *seen.borrow_mut() += 1);
        });

        let event = HubEvent::ProcessKilled {
            pid: 1,
            message: "ok".to_string(),
        };
        bus.emit(&event);
        bus.emit(&event);
        assert_eq!(*seen.borrow(), 1);
    }

    #[test]
    fn test_poll_skips_running_sample() {
        let clock = ManualClock::new();
        let mut hub =
            MonitorHub::with_clock(MonitorConfig::default(), Rc::new(clock.clone())).unwrap();

        assert_eq!(hub.poll(), 0);
        hub.start_monitoring();
        assert_eq!(hub.poll(), 2);

        hub.wait(DataKind::System);
        hub.wait(DataKind::Traffic);
        assert_eq!(hub.poll(), 0);

        clock.advance(Duration::from_secs(1));
        assert_eq!(hub.poll(), 1);
    }

    #[test]
    fn test_zero_update_interval_rejected() {
        let mut hub = MonitorHub::new(MonitorConfig::default()).unwrap();
        assert!(hub.set_update_interval(Duration::ZERO).is_err());
        assert!(hub.set_update_interval(Duration::from_millis(500)).is_ok());
        assert_eq!(hub.config().system_interval_ms, 500);
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = HubEvent::Error {
            source: DataKind::Connections,
            message: "denied".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "error");
        assert_eq!(json["data"]["source"], "connections");
    }
}
