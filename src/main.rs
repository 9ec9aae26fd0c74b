//! spectator - record spectating sessions from a BLE tap pad

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use spectator::config::Config;
use spectator::format::{format_date_time, format_time};
use spectator::history::{self, event_label};
use spectator::link::{DeviceLink, SimPeripheral, SimTransport};
use spectator::store::{DataStore, FileBackend};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "spectator")]
#[command(about = "Record taps and status signals from a BLE spectator pad")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for session and event records
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Use a simulated pad instead of Bluetooth
    #[arg(long)]
    simulate: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the terminal UI (default)
    Run,
    /// Print recorded sessions, newest first
    Sessions,
    /// Print one session with its timeline
    Show {
        /// Session id
        id: String,
    },
    /// Delete all recorded sessions and events
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Log to a file while the UI owns the terminal
fn init_file_logging(config: &Config) -> Result<()> {
    let path = config.log_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {:?}", path))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file))
        .init();
    Ok(())
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = Some(dir);
    }

    let backend = FileBackend::open(config.data_dir()).context("Failed to open data directory")?;
    let store = DataStore::new(backend);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            init_file_logging(&config)?;
            tracing::info!("Spectator starting, data in {:?}", config.data_dir());
            run_ui(&config, store, cli.simulate).await
        }
        Commands::Sessions => {
            init_stderr_logging();
            print_sessions(&store)
        }
        Commands::Show { id } => {
            init_stderr_logging();
            print_session(&store, &id, config.history.timeline_limit)
        }
        Commands::Clear { yes } => {
            init_stderr_logging();
            if !yes {
                bail!("Refusing to delete all data without --yes");
            }
            store.clear_all_data()?;
            println!("All sessions and events deleted.");
            Ok(())
        }
    }
}

async fn run_ui(config: &Config, store: DataStore<FileBackend>, simulate: bool) -> Result<()> {
    #[cfg(feature = "bluetooth")]
    if !simulate {
        let transport = spectator::link::BleTransport::new(config.device.scan_timeout());
        let link = Arc::new(DeviceLink::new(transport, config.device.profile()));
        return spectator::client::run(config, link, store, None).await;
    }

    if !simulate {
        tracing::warn!("Built without the bluetooth feature, using a simulated pad");
    }
    let pad = SimPeripheral::new("Simulated Pad");
    let link = Arc::new(DeviceLink::new(
        SimTransport::new(pad.clone()),
        config.device.profile(),
    ));
    spectator::client::run(config, link, store, Some(pad)).await
}

fn print_sessions(store: &DataStore<FileBackend>) -> Result<()> {
    let sessions = history::list_sessions(store)?;
    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }
    for s in sessions {
        println!(
            "{}  {}  {:<9}  taps={} chance={} pinch={} normal={}  {}",
            s.id,
            format_date_time(&s.date_time),
            if s.is_active() { "active" } else { "completed" },
            s.tap_count_total,
            s.chance_count_total,
            s.pinch_count_total,
            s.normal_count_total,
            s.device_name.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

fn print_session(store: &DataStore<FileBackend>, id: &str, limit: usize) -> Result<()> {
    let Some(detail) = history::session_detail(store, id, limit)? else {
        bail!("Session '{}' not found", id);
    };
    let stats = &detail.stats;
    println!("Session   {}", stats.session.id);
    println!("Started   {}", format_date_time(&stats.session.date_time));
    println!("Duration  {}", stats.duration_formatted);
    println!(
        "Device    {}",
        stats.session.device_name.as_deref().unwrap_or("Unknown")
    );
    println!(
        "Counts    taps={} chance={} pinch={} normal={}",
        stats.tap_count, stats.chance_count, stats.pinch_count, stats.normal_count
    );
    println!(
        "Timeline  ({} of {} events)",
        detail.timeline.len(),
        detail.total_events
    );
    for event in &detail.timeline {
        println!(
            "  {}  {}",
            format_time(&event.timestamp, true),
            event_label(event.event_type)
        );
    }
    Ok(())
}
