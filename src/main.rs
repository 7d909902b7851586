use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sysdash::core::cache::Fetch;
use sysdash::{HubEvent, MonitorConfig, MonitorHub};

fn main() -> Result<()> {
    sysdash::init_logging();

    let matches = Command::new("sysdash")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Headless system monitor that prints every update as a JSON line")
        .arg(
            Arg::new("interval")
                .short('i')
                .long("interval")
                .value_name("MS")
                .help("System sampling interval in milliseconds")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("processes")
                .short('p')
                .long("processes")
                .help("Fetch the process list once at start")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("connections")
                .short('c')
                .long("connections")
                .help("Fetch network connections and per-process traffic once at start")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("hardware")
                .long("hardware")
                .help("Fetch hardware, sensors, services and system details once at start")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("duration")
                .short('d')
                .long("duration")
                .value_name("SECS")
                .help("Stop after this many seconds (default: run until Ctrl+C)")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("Config file (default: <config dir>/sysdash/config.json)"),
        )
        .get_matches();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => MonitorConfig::load_from(Path::new(path))?,
        None => MonitorConfig::load()?,
    };
    if let Some(interval) = matches.get_one::<u64>("interval") {
        config.system_interval_ms = *interval;
    }

    let mut hub = MonitorHub::new(config).context("Failed to start monitor")?;
    hub.subscribe(print_event);

    if matches.get_flag("processes") {
        print_ready(hub.processes(false), HubEvent::Processes);
    }
    if matches.get_flag("connections") {
        print_ready(hub.connections(false), HubEvent::Connections);
        print_ready(hub.process_traffic(false), HubEvent::ProcessTraffic);
    }
    if matches.get_flag("hardware") {
        print_ready(hub.hardware(false), HubEvent::Hardware);
        print_ready(hub.details(false), HubEvent::Details);
        hub.sensors();
        hub.services();
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    // Setup Ctrl+C handler
    ctrlc::set_handler(move || {
        shutdown_clone.store(true, Ordering::Relaxed);
    })
    .map_err(|e| anyhow::anyhow!("Failed to set Ctrl+C handler: {}", e))?;

    if let Some(secs) = matches.get_one::<u64>("duration").copied() {
        let shutdown = shutdown.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(secs));
            shutdown.store(true, Ordering::Relaxed);
        });
    }

    hub.start_monitoring();
    hub.run(&shutdown);
    log::info!("Shutting down");

    Ok(())
}

fn print_event(event: &HubEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{}", line),
        Err(e) => log::error!("Failed to serialize event: {}", e),
    }
}

fn print_ready<T>(fetch: Fetch<T>, wrap: fn(Arc<T>) -> HubEvent) {
    if let Fetch::Ready(snapshot) = fetch {
        print_event(&wrap(snapshot));
    }
}
