//! rtkrelay CLI - operator tooling
//!
//! Commands that work without a running relay: port discovery, command
//! framing, line checksum checks and offline replay of captured streams.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use rtkrelay_core::cli::{print_exit_codes, render, CliResult, ExitCodes, OutputFormat};
use rtkrelay_core::config::AppConfig;
use rtkrelay_core::core::clock::ManualClock;
use rtkrelay_core::core::handshake::DeviceFamily;
use rtkrelay_core::core::logger::SessionLogger;
use rtkrelay_core::core::protocol::checksum::{hex_dump, verify_line};
use rtkrelay_core::core::session::{DriverTimings, StatusSnapshot, StreamDriver};
use rtkrelay_core::core::transport::{list_ports, RecordingSink};

/// rtkrelay CLI
#[derive(Parser, Debug)]
#[command(
    name = "rtkrelay-cli",
    version,
    about = "Tools for RTK base station receivers",
    long_about = None
)]
struct Cli {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available serial ports
    ListPorts,

    /// Show the bytes a command is sent as
    Frame {
        /// Command text without framing (e.g. PQTMVERNO)
        command: String,

        /// Receiver family
        #[arg(long, default_value = "quectel")]
        family: DeviceFamily,
    },

    /// Verify the checksum of a received line
    Verify {
        /// Line as received, without CR/LF
        line: String,

        /// Receiver family, selects the checksum scope
        #[arg(long, default_value = "quectel")]
        family: DeviceFamily,
    },

    /// Run a captured byte stream through the relay pipeline offline
    Replay {
        /// Capture file (raw bytes as read from the receiver)
        file: PathBuf,

        /// Receiver family
        #[arg(long, default_value = "quectel")]
        family: DeviceFamily,

        /// Bytes fed per read
        #[arg(long, default_value = "512")]
        chunk: usize,

        /// Simulated milliseconds between reads
        #[arg(long, default_value = "100")]
        interval_ms: u64,

        /// Start the initialization sequence before replaying
        #[arg(long)]
        init: bool,

        /// Log lines to include in the report
        #[arg(long, default_value = "20")]
        history: usize,
    },

    /// Show the effective configuration
    Config {
        /// Config file (defaults to the platform config directory)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Print the exit code table
    ExitCodes,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    let result = match &cli.command {
        Commands::ListPorts => cmd_list_ports(&cli),
        Commands::Frame { command, family } => Ok(cmd_frame(&cli, command, *family)),
        Commands::Verify { line, family } => Ok(cmd_verify(&cli, line, *family)),
        Commands::Replay {
            file,
            family,
            chunk,
            interval_ms,
            init,
            history,
        } => cmd_replay(
            &cli,
            file,
            &ReplayOptions {
                family: *family,
                chunk: *chunk,
                interval_ms: *interval_ms,
                init: *init,
                history: *history,
            },
        ),
        Commands::Config { path } => cmd_config(path.as_deref()),
        Commands::ExitCodes => {
            print_exit_codes();
            Ok(CliResult::success())
        }
    };

    match result {
        Ok(outcome) => {
            if let CliResult::Error(_, message) = &outcome {
                eprintln!("{message}");
            }
            outcome.to_exit_code()
        }
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(ExitCodes::for_error(&err))
        }
    }
}

fn init_tracing(cli: &Cli) {
    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn cmd_list_ports(cli: &Cli) -> anyhow::Result<CliResult> {
    let ports = list_ports()?;

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&ports)?),
        OutputFormat::Text => {
            if ports.is_empty() && !cli.quiet {
                println!("No serial ports found.");
            }
            for port in &ports {
                match &port.description {
                    Some(description) => println!("{} [{}] {description}", port.name, port.kind),
                    None => println!("{} [{}]", port.name, port.kind),
                }
            }
        }
    }
    Ok(CliResult::success())
}

fn cmd_frame(cli: &Cli, command: &str, family: DeviceFamily) -> CliResult {
    let wire = family.profile().framing.frame(command);
    match cli.format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({
                "family": family,
                "text": wire,
                "hex": hex_dump(wire.as_bytes()).trim_end(),
            })
        ),
        OutputFormat::Text => {
            println!("{}", wire.escape_debug());
            if cli.verbose {
                println!("{}", hex_dump(wire.as_bytes()));
            }
        }
    }
    CliResult::success()
}

fn cmd_verify(cli: &Cli, line: &str, family: DeviceFamily) -> CliResult {
    let line = line.trim_end_matches(['\r', '\n']);
    let scope = family.profile().scope_for(line);
    let verdict = verify_line(line, scope);

    match cli.format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({
                "line": line,
                "scope": format!("{scope:?}"),
                "valid": verdict.is_ok(),
                "error": verdict.as_ref().err().map(ToString::to_string),
            })
        ),
        OutputFormat::Text => {
            if verdict.is_ok() && !cli.quiet {
                println!("OK");
            }
        }
    }

    match verdict {
        Ok(()) => CliResult::success(),
        Err(e) => CliResult::validation_failed(format!("{line}: {e}")),
    }
}

struct ReplayOptions {
    family: DeviceFamily,
    chunk: usize,
    interval_ms: u64,
    init: bool,
    history: usize,
}

/// Outcome of an offline replay
#[derive(Debug, Serialize)]
struct ReplayReport {
    file: String,
    bytes: usize,
    status: StatusSnapshot,
    commands_sent: Vec<String>,
    log: Vec<String>,
}

impl fmt::Display for ReplayReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Replayed {} ({} bytes)", self.file, self.bytes)?;
        write!(f, "{}", self.status)?;
        if let Some(mean) = &self.status.mean_location {
            writeln!(f, "Location Mean {}", mean.batches)?;
            writeln!(f, "\tLatitude  {:.6}", mean.latitude)?;
            writeln!(f, "\tLongitude {:.6}", mean.longitude)?;
            writeln!(f, "\tHeight    {:.6}m", mean.height)?;
        }
        if !self.commands_sent.is_empty() {
            writeln!(f, "Commands sent")?;
            for command in &self.commands_sent {
                writeln!(f, "\t{command}")?;
            }
        }
        if !self.log.is_empty() {
            writeln!(f, "Log")?;
            for line in &self.log {
                writeln!(f, "\t{line}")?;
            }
        }
        Ok(())
    }
}

fn cmd_replay(cli: &Cli, file: &Path, options: &ReplayOptions) -> anyhow::Result<CliResult> {
    if options.chunk == 0 {
        return Ok(CliResult::error(ExitCodes::INVALID_ARGS, "--chunk must be at least 1"));
    }
    let data = std::fs::read(file)?;

    let sink = RecordingSink::new();
    let clock = Arc::new(ManualClock::new(0));
    let (history, logger) = SessionLogger::new(options.history.max(1))
        .with_debug_history(cli.verbose)
        .into_handle();

    let mut driver = StreamDriver::new(
        options.family.profile(),
        Box::new(sink.clone()),
        clock.clone(),
        logger,
        DriverTimings::default(),
    );
    if options.init {
        driver.initialize()?;
    }

    for chunk in data.chunks(options.chunk) {
        driver.process_chunk(chunk)?;
        clock.advance(options.interval_ms);
        driver.poll()?;
    }
    driver.finish();

    let report = ReplayReport {
        file: file.display().to_string(),
        bytes: data.len(),
        status: driver.status(),
        commands_sent: sink
            .lines()
            .iter()
            .map(|l| l.trim_end().to_string())
            .collect(),
        log: history
            .recent(options.history)
            .iter()
            .map(ToString::to_string)
            .collect(),
    };
    if !cli.quiet {
        print!("{}", render(&report, cli.format));
        if cli.format == OutputFormat::Json {
            println!();
        }
    }
    Ok(CliResult::success())
}

fn cmd_config(path: Option<&Path>) -> anyhow::Result<CliResult> {
    let config = match path {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::load_default()?,
    };
    match AppConfig::default_path() {
        Ok(default) => println!("# default location: {}", default.display()),
        Err(e) => println!("# {e}"),
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(CliResult::success())
}
