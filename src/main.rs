use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{interval, Duration};

use locationcore_viz::live_status::LiveStatus;
use locationcore_viz::{Connector, ConnectorConfig, ConnectorEvent, SerialPorts, Signal};

#[derive(Parser, Debug)]
#[command(name = "locationcore")]
#[command(about = "Serial ingest for the location core device: live state, histories, session log", long_about = None)]
struct Args {
    /// List serial endpoints and exit
    #[arg(long)]
    list: bool,

    /// Endpoint to open (default: first one found)
    #[arg(long)]
    port: Option<String>,

    /// JSON config file; missing keys keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Session log directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Disable the CSV session log
    #[arg(long)]
    no_log: bool,

    /// History buffer capacity per signal
    #[arg(long)]
    history_capacity: Option<usize>,

    /// Device meters to display units
    #[arg(long)]
    position_scale: Option<f32>,

    /// Consumer tick period in milliseconds
    #[arg(long, default_value = "100")]
    tick_ms: u64,

    /// Write a JSON status snapshot here every tick
    #[arg(long)]
    status_file: Option<PathBuf>,
}

fn ts_now() -> String {
    Local::now().format("%H:%M:%S%.3f").to_string()
}

fn load_config(args: &Args) -> Result<ConnectorConfig> {
    let mut config = match &args.config {
        Some(path) => ConnectorConfig::from_json_file(path)?,
        None => ConnectorConfig::default(),
    };
    if let Some(dir) = &args.log_dir {
        config.log_dir = dir.clone();
    }
    if args.no_log {
        config.enable_session_log = false;
    }
    if let Some(capacity) = args.history_capacity {
        config.history_capacity = capacity;
        config.display_length = config.display_length.min(capacity);
    }
    if let Some(scale) = args.position_scale {
        config.position_scale = scale;
    }
    config.validate()?;
    Ok(config)
}

fn report(event: &ConnectorEvent) {
    match event {
        ConnectorEvent::SessionStarted { path } => {
            println!("[{}] Logging to {}", ts_now(), path.display())
        }
        ConnectorEvent::Connected { endpoint } => println!("[{}] Connected: {}", ts_now(), endpoint),
        ConnectorEvent::Disconnected { endpoint, reason } => {
            println!("[{}] Lost {}: {}", ts_now(), endpoint, reason)
        }
        ConnectorEvent::Reconnecting { endpoint, attempt, wait } => println!(
            "[{}] Reconnecting to {} (attempt {}) in {:.1}s",
            ts_now(),
            endpoint,
            attempt,
            wait.as_secs_f64()
        ),
        ConnectorEvent::GaveUp { endpoint, attempts } => {
            println!("[{}] Gave up on {} after {} attempts", ts_now(), endpoint, attempts)
        }
        // Already logged at warn by the connector; counted in metrics.
        ConnectorEvent::DecodeFailed { .. } => {}
        ConnectorEvent::LogWriteFailed { reason } => {
            println!("[{}] Log write failed: {}", ts_now(), reason)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = load_config(&args)?;

    let provider = Arc::new(SerialPorts::from_config(&config));
    let connector = Arc::new(Connector::new(config, provider)?);

    // Enumeration may wait for a device to be plugged in.
    let endpoints = {
        let connector = connector.clone();
        tokio::task::spawn_blocking(move || connector.list_endpoints()).await??
    };

    if args.list {
        for name in &endpoints {
            println!("{}", name);
        }
        return Ok(());
    }

    let endpoint = match &args.port {
        Some(port) => port.clone(),
        None => endpoints
            .first()
            .cloned()
            .context("no serial endpoints available")?,
    };

    println!("[{}] LocationCore starting", ts_now());
    println!("  Endpoint: {}", endpoint);
    println!("  Baud: {}", connector.config().baud_rate);
    println!("  History: {} samples", connector.config().history_capacity);

    connector
        .connect(&endpoint)
        .with_context(|| format!("opening {}", endpoint))?;

    let events = connector.events();
    let mut ticker = interval(Duration::from_millis(args.tick_ms.max(1)));
    let ticks_per_summary = (1_000 / args.tick_ms.max(1)).max(1);
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("[{}] Ctrl-C, shutting down", ts_now());
                break;
            }
            _ = ticker.tick() => {
                for event in events.try_iter() {
                    report(&event);
                }

                // State and trails from the same apply.
                let (state, trails) = connector.with_view(|state, histories| {
                    let trails: Vec<String> = Signal::ALL
                        .iter()
                        .map(|s| format!("{}={}", s.name(), histories.read_display(*s).len()))
                        .collect();
                    (state.clone(), trails.join(" "))
                })?;
                tick += 1;
                if tick % ticks_per_summary == 0 {
                    let m = connector.metrics();
                    log::info!(
                        "pos=({:.1}, {:.1}, {:.1}) euler=({:.1}, {:.1}, {:.1}) cpu p/u={:.2}/{:.2} rate={:.1}/s decode_err={} [{}]",
                        state.position.x,
                        state.position.y,
                        state.position.z,
                        state.orientation_euler_deg.x,
                        state.orientation_euler_deg.y,
                        state.orientation_euler_deg.z,
                        state.predict_cpu,
                        state.update_cpu,
                        m.records_per_second,
                        m.decode_failures,
                        trails
                    );
                }

                if let Some(path) = &args.status_file {
                    let status = LiveStatus::new(
                        &state,
                        connector.metrics(),
                        connector.endpoint(),
                        connector.link_state(),
                    );
                    if let Err(e) = status.save(path) {
                        log::warn!("Status write to {} failed: {}", path.display(), e);
                    }
                }
            }
        }
    }

    let connector_for_shutdown = connector.clone();
    tokio::task::spawn_blocking(move || connector_for_shutdown.disconnect()).await??;
    println!("[{}] Stopped", ts_now());
    Ok(())
}
