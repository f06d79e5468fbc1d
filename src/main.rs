//! rtkrelay - RTK base station relay
//!
//! Reads a GNSS receiver's serial stream, initializes the receiver, averages
//! its position and pushes verified RTCM3 frames to the configured casters.
//! Runs until Ctrl+C, then prints the averaged base position.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use rtkrelay_core::core::bridge::CasterRelay;
use rtkrelay_core::core::clock::{Clock, SystemClock};
use rtkrelay_core::core::handshake::DeviceFamily;
use rtkrelay_core::core::logger::SessionLogger;
use rtkrelay_core::core::session::StreamDriver;
use rtkrelay_core::core::transport::SerialTransport;
use rtkrelay_core::{AppConfig, ExitCodes, VERSION};

/// RTK base station relay
#[derive(Parser, Debug)]
#[command(name = "rtkrelay", version, about = "RTK base station relay", long_about = None)]
struct Args {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, env = "RTKRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Serial port, overrides the config file
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate, overrides the config file
    #[arg(short, long)]
    baud: Option<u32>,

    /// Receiver family (quectel, unicore), overrides the config file
    #[arg(short, long)]
    family: Option<DeviceFamily>,

    /// Initialize the receiver immediately instead of waiting for the stall timer
    #[arg(long)]
    init: bool,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    write_config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("Error: {err:#}");
            ExitCode::from(ExitCodes::for_error(&err))
        }
    }
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::load_default()?,
    };
    if let Some(port) = &args.port {
        config.serial.port.clone_from(port);
    }
    if let Some(baud) = args.baud {
        config.serial.baud_rate = baud;
    }
    if let Some(family) = args.family {
        config.receiver.family = family;
    }
    if args.init {
        config.receiver.initialize_on_start = true;
    }
    Ok(config)
}

fn init_tracing(directory: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer().with_target(false);

    let Some(directory) = directory else {
        tracing_subscriber::registry().with(filter).with(console).init();
        return Ok(None);
    };

    std::fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create log directory {}", directory.display()))?;
    let appender = tracing_appender::rolling::daily(directory, "rtkrelay.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false);
    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
    Ok(Some(guard))
}

fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    if let Some(path) = &args.write_config {
        config.save(path)?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }
    config.validate()?;

    let _guard = init_tracing(config.logging.directory.as_deref())?;
    tracing::info!("Starting rtkrelay v{}", VERSION);

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("Failed to install Ctrl+C handler")?;
    }

    let (history, logger) = SessionLogger::new(config.logging.history_lines).into_handle();

    let mut port = SerialTransport::open(config.serial_config())
        .with_context(|| format!("Failed to open receiver port {}", config.serial.port))?;
    logger.info(format!("Opened {}", port.connection_info()));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let mut driver = StreamDriver::new(
        config.receiver.family.profile(),
        Box::new(port.sink()?),
        clock,
        logger.clone(),
        config.receiver.timings(),
    );
    for caster in config.enabled_casters() {
        driver.add_consumer(Box::new(CasterRelay::start(caster.clone(), logger.clone())));
    }
    if config.receiver.initialize_on_start {
        driver.initialize()?;
    }

    let status_interval = Duration::from_secs(config.logging.status_interval_secs.max(1));
    let mut last_status = Instant::now();

    while running.load(Ordering::SeqCst) {
        let chunk = port.receive()?;
        driver.process_chunk(&chunk)?;
        driver.poll()?;

        if last_status.elapsed() >= status_interval {
            tracing::info!("Status\n{}", driver.status());
            last_status = Instant::now();
        }
    }

    logger.info("Shutting down");
    tracing::info!("Status\n{}", driver.status());
    driver.finish();

    if let Some(directory) = &config.logging.directory {
        let format = config.logging.history_format;
        let path = directory.join(format!("history.{}", format.extension()));
        std::fs::write(&path, history.export(format))
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}
