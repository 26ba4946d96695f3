// Module declarations for the application's core components
pub mod channels;  // Inter-component communication channels
pub mod config;    // Configuration management
pub mod database;  // Storage of block averages
pub mod error;     // Error helper macros
pub mod event_log; // Append-only event log
pub mod options;   // Command line options parsing
pub mod p1;        // P1 port telegram acquisition
pub mod poller;    // Polling loop, error budget and averaging
pub mod prelude;   // Common imports and types

// Get the package version from Cargo.toml
const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::options::Options;
use crate::p1::{PortSettings, SerialLinePort};
use crate::prelude::*;
use std::io::Write;
use std::time::Duration;

fn init_logging(level: &str) {
    let result = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .try_init();

    if let Err(e) = result {
        eprintln!("Failed to initialise logging: {}", e);
    }
}

fn load_config(options: &Options) -> Result<Config> {
    let config = Config::new(options.config_file.clone())?;

    init_logging(&config.loglevel);
    info!(
        "p1-reader {} starting with config file: {}",
        CARGO_PKG_VERSION, options.config_file
    );
    config.log_summary();

    Ok(config)
}

/// Main application entry point
///
/// Loads the configuration, starts the database task and runs the poller
/// until it terminates, the runtime limit is reached, or a shutdown signal
/// arrives. Returns the state the poller ended in, or an error when the
/// database cannot be opened.
pub async fn app(shutdown_rx: broadcast::Receiver<()>, options: Options) -> Result<LoopState> {
    let config = load_config(&options)?;

    let event_log = EventLog::new(&config.event_log)?;
    event_log.append("program started", None)?;

    info!("Initializing channels...");
    let channels = Channels::new();

    info!("  Creating Database...");
    let database = Database::new(&config.database_url, channels.clone());
    if let Err(err) = database.open().await {
        let message = format!("cannot open database {}, stopping", config.database_url);
        error!("{}: {:#}", message, err);
        event_log.append(&message, Some(&format!("{:#}", err)))?;
        event_log.append("program stopped after a fatal error", None)?;
        return Err(err.context(message));
    }
    let database_rx = channels.to_database.subscribe();
    let database_clone = database.clone();
    let database_handle = tokio::spawn(async move {
        if let Err(e) = database_clone.start(database_rx).await {
            error!("Database task failed: {}", e);
        }
    });

    info!("  Creating display...");
    let display_handle = tokio::spawn(display(channels.latest_reading.subscribe()));

    info!("  Creating Poller on {}...", config.serial_port);
    let port = SerialLinePort::new(PortSettings::new(config.serial_port.clone()));
    let mut poller = Poller::new(
        MeterReader::new(port),
        config.max_serial_errors,
        config.block_size,
        channels.clone(),
        event_log.clone(),
    );

    let runtime = options.runtime.map(Duration::from_secs);
    let state = match poller.run(config.poll_interval, shutdown_rx, runtime).await {
        Ok(state) => state,
        Err(e) => {
            error!("Poller failed: {}", e);
            LoopState::Terminated
        }
    };

    info!("Stopping components...");
    database.stop();
    if let Err(e) = database_handle.await {
        error!("Error waiting for database task: {}", e);
    }
    database.close().await?;
    display_handle.abort();

    let message = match state {
        LoopState::Terminated => "program stopped after a fatal error",
        _ => "program stopped",
    };
    event_log.append(message, None)?;
    info!("{}", message);

    Ok(state)
}

async fn display(mut receiver: broadcast::Receiver<PowerReading>) {
    use broadcast::error::RecvError;

    loop {
        match receiver.recv().await {
            Ok(reading) => match reading.selected() {
                w if w > 0 => info!("now using {} W", w),
                w if w < 0 => info!("now returning {} W", -w),
                _ => info!("now at 0 W"),
            },
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
}

/// Prints the newest `max_recent_readings` stored readings as JSON.
pub async fn print_recent(options: Options) -> Result<()> {
    let config = load_config(&options)?;

    let database = Database::new(&config.database_url, Channels::new());
    database.open().await?;

    let readings = database.fetch_recent(config.max_recent_readings).await?;
    database.close().await?;

    println!("{}", serde_json::to_string_pretty(&readings)?);

    Ok(())
}
