use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use compass_tester_rs::config::{
    DashboardConfig, SerialConfig, SourceKind, DEFAULT_BAUD_RATE, DEFAULT_EXPORT_FILE,
    DEFAULT_HTTP_PORT, DEFAULT_READ_TIMEOUT_MS, DEFAULT_REFRESH_MS, DEFAULT_SERIAL_PORT,
    MAX_POINTS,
};
use compass_tester_rs::dashboard::{start_dashboard, AppState};
use compass_tester_rs::sensors::{spawn_serial_reader, LatestReading, LiveSource, SampleSource, Simulator};
use compass_tester_rs::session::{lock_session, refresh_loop, Session};

#[derive(Parser, Debug)]
#[command(name = "compass_tester")]
#[command(about = "Live HMC5883L magnetometer dashboard", long_about = None)]
struct Args {
    /// Serial port the sensor is attached to
    #[arg(long, default_value = DEFAULT_SERIAL_PORT)]
    port: String,

    /// Serial baud rate
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Use random samples instead of a serial device
    #[arg(long)]
    simulate: bool,

    /// Refresh interval in milliseconds
    #[arg(long, default_value_t = DEFAULT_REFRESH_MS)]
    interval_ms: u64,

    /// Number of samples kept in the rolling history
    #[arg(long, default_value_t = MAX_POINTS)]
    capacity: usize,

    /// CSV file written on every stop
    #[arg(long, default_value = DEFAULT_EXPORT_FILE)]
    output: PathBuf,

    /// Port to serve the dashboard on
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT)]
    http_port: u16,

    /// Start refreshing immediately
    #[arg(long)]
    autostart: bool,
}

impl Args {
    fn into_config(self) -> DashboardConfig {
        DashboardConfig {
            source: if self.simulate {
                SourceKind::Simulator
            } else {
                SourceKind::Serial
            },
            serial: SerialConfig {
                port: self.port,
                baud_rate: self.baud,
                read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            },
            capacity: self.capacity,
            refresh_interval_ms: self.interval_ms,
            export_path: self.output,
            http_port: self.http_port,
            autostart: self.autostart,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config();
    config.validate()?;

    log::info!("Compass Tester starting");
    log::info!("  Source: {:?}", config.source);
    log::info!("  History: {} samples every {} ms", config.capacity, config.refresh_interval_ms);
    log::info!("  Export: {}", config.export_path.display());

    let source: Box<dyn SampleSource> = match config.source {
        SourceKind::Serial => {
            let latest = LatestReading::new();
            // Detached: the worker lives until the stream fails or the process exits
            let _reader = spawn_serial_reader(config.serial.clone(), latest.clone())?;
            Box::new(LiveSource::new(latest))
        }
        SourceKind::Simulator => Box::new(Simulator::new()),
    };

    let mut session = Session::from_config(&config, source);
    if config.autostart {
        session.start();
    }

    let (frames_tx, _frames_rx) = watch::channel(session.frame());
    let frames = Arc::new(frames_tx);
    let session = Arc::new(Mutex::new(session));

    let refresh = tokio::spawn(refresh_loop(
        session.clone(),
        config.refresh_interval(),
        frames.clone(),
    ));

    let http_port = config.http_port;
    let state = AppState::new(session.clone(), frames, config);

    tokio::select! {
        res = start_dashboard(state, http_port) => res?,
        _ = tokio::signal::ctrl_c() => log::info!("Shutting down"),
    }
    refresh.abort();

    // An active run is exported the same way as pressing stop
    if let Some(summary) = lock_session(&session).stop()? {
        log::info!("Final save: {} samples to {}", summary.rows, summary.path.display());
    }

    Ok(())
}
