//! RegProbe CLI - Command-line interface
//!
//! Drives a session against a simulated register device described by a TOML
//! profile (`--device`), or the built-in demo device when none is given.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use regprobe_core::cli::{print_exit_codes, CliResult, ExitCodes};
use regprobe_core::core::logger::generate_log_filename;
use regprobe_core::{
    AppConfig, CommandRequest, ConnectionConfig, DeviceProfile, NoResponseLogging, Parity,
    RegisterOutcome, ScanStart, ScanState, Session, SessionEvent, SessionLogger,
    SimulatedDevice,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

/// CLI output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON format for scripting
    Json,
}

/// RegProbe CLI
#[derive(Parser, Debug)]
#[command(
    name = "regprobe",
    version,
    about = "Send raw frames to and scan registers of serial devices",
    long_about = None
)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, env = "REGPROBE_CONFIG")]
    config: Option<PathBuf>,

    /// Simulated device profile (TOML)
    #[arg(long, global = true, env = "REGPROBE_DEVICE")]
    device: Option<PathBuf>,

    /// Port name (e.g., COM3, /dev/ttyUSB0)
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long, global = true)]
    baud: Option<u32>,

    /// Parity (none, even, odd, mark, space)
    #[arg(long, global = true, value_parser = parse_parity)]
    parity: Option<Parity>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Mirror the event log to this file
    #[arg(short = 'l', long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available ports
    ListPorts,

    /// Send a raw hex frame
    Send {
        /// Frame bytes, e.g. "01 03 00 00 00 0A"
        data: String,

        /// Send the bytes as typed, without a checksum
        #[arg(long)]
        no_checksum: bool,
    },

    /// Scan a register range (Ctrl+C cancels)
    Scan {
        /// Slave id
        #[arg(short, long)]
        slave: Option<u8>,

        /// First address
        #[arg(long)]
        start: Option<u16>,

        /// Number of addresses
        #[arg(short, long)]
        count: Option<u32>,

        /// Function code (3 = holding registers, others = input registers)
        #[arg(long)]
        function_code: Option<u8>,

        /// Pause after each read (milliseconds)
        #[arg(long)]
        pacing_ms: Option<u64>,

        /// Log registers that do not answer
        #[arg(long)]
        log_no_response: bool,
    },

    /// Show build information
    Info,

    /// Print the exit code table
    ExitCodes,
}

fn parse_parity(s: &str) -> Result<Parity, String> {
    s.parse().map_err(|e: regprobe_core::TransportError| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    let result = match run(&cli).await {
        Ok(result) => result,
        Err(e) => CliResult::error(ExitCodes::ERROR, format!("{e:#}")),
    };

    match (&result, result.message()) {
        (CliResult::Error(..), Some(msg)) => eprintln!("Error: {msg}"),
        (CliResult::Success(_), Some(msg)) if !cli.quiet => eprintln!("{msg}"),
        _ => {}
    }
    result.to_exit_code()
}

fn init_tracing(cli: &Cli) {
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else if cli.quiet {
        tracing::Level::ERROR
    } else {
        tracing::Level::WARN
    };
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.format == OutputFormat::Json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: &Cli) -> anyhow::Result<CliResult> {
    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return Ok(CliResult::from(&e)),
    };

    match &cli.command {
        Commands::ListPorts => list_ports(cli, &config).await,
        Commands::Send { data, no_checksum } => send(cli, &config, data, !*no_checksum).await,
        Commands::Scan {
            slave,
            start,
            count,
            function_code,
            pacing_ms,
            log_no_response,
        } => {
            let mut defaults = config.scan.clone();
            defaults.slave_id = slave.unwrap_or(defaults.slave_id);
            defaults.start = start.unwrap_or(defaults.start);
            defaults.count = count.unwrap_or(defaults.count);
            defaults.function_code = function_code.unwrap_or(defaults.function_code);
            defaults.pacing_ms = pacing_ms.unwrap_or(defaults.pacing_ms);
            if *log_no_response {
                defaults.no_response = NoResponseLogging::Log;
            }
            let mut config = config;
            config.scan = defaults;
            scan(cli, &config).await
        }
        Commands::Info => show_info(cli),
        Commands::ExitCodes => {
            print_exit_codes();
            Ok(CliResult::success())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<AppConfig, regprobe_core::ConfigError> {
    match path {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
}

fn link_config(cli: &Cli, config: &AppConfig) -> ConnectionConfig {
    let defaults = &config.connection;
    ConnectionConfig::new(
        cli.port.as_deref().unwrap_or(&defaults.port),
        cli.baud.unwrap_or(defaults.baud_rate),
    )
    .parity(cli.parity.unwrap_or(defaults.parity))
}

fn open_device(cli: &Cli) -> anyhow::Result<SimulatedDevice> {
    let profile = match &cli.device {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading device profile {}", path.display()))?;
            DeviceProfile::from_toml(&content)
                .with_context(|| format!("parsing device profile {}", path.display()))?
        }
        None => DeviceProfile::demo(),
    };
    Ok(SimulatedDevice::new(profile)?)
}

/// Build a session with the event log attached and mirrored as configured
fn open_session(
    cli: &Cli,
    config: &AppConfig,
) -> anyhow::Result<(Session, regprobe_core::Logger)> {
    let mut logger = SessionLogger::new();
    logger.set_max_buffer(config.logging.max_buffer);
    if let Some(path) = cli.log_file.as_ref().or(config.logging.file.as_ref()) {
        let format = config.logging.format;
        let path = if path.is_dir() {
            path.join(generate_log_filename("regprobe", format))
        } else {
            path.clone()
        };
        logger
            .start(&path, format)
            .with_context(|| format!("opening log file {}", path.display()))?;
    }
    let logger = logger.shared();

    let device = open_device(cli)?;
    let session = Session::new(Box::new(device), logger.clone(), config.scan.settings());
    Ok((session, logger))
}

async fn list_ports(cli: &Cli, config: &AppConfig) -> anyhow::Result<CliResult> {
    let (session, _logger) = open_session(cli, config)?;
    let ports = match session.list_ports().await {
        Ok(ports) => ports,
        Err(e) => return Ok(CliResult::from(&e)),
    };

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&ports)?),
        OutputFormat::Text => {
            if ports.is_empty() && !cli.quiet {
                println!("No ports found.");
            }
            for port in &ports {
                println!("{port}");
            }
        }
    }
    Ok(CliResult::success())
}

async fn send(
    cli: &Cli,
    config: &AppConfig,
    data: &str,
    append_checksum: bool,
) -> anyhow::Result<CliResult> {
    let (session, logger) = open_session(cli, config)?;
    let link = link_config(cli, config);
    if let Err(e) = session.connect(link).await {
        return Ok(CliResult::from(&e));
    }

    let result = session.send(CommandRequest::new(data, append_checksum)).await;
    session.disconnect().await.ok();
    logger.lock().flush();

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => {
            if let Some(tx) = &result.transmitted {
                println!("TX: {tx}");
            }
            match &result.received {
                Some(rx) => {
                    let verdict = if result.checksum_valid { "CRC OK" } else { "CRC FAIL" };
                    println!("RX: {rx} [{verdict}]");
                }
                None if result.is_ok() => println!("RX: (No Response)"),
                None => {}
            }
        }
    }

    Ok(match (&result.failure, &result.received) {
        (Some(failure), _) => CliResult::from(failure),
        (None, None) => CliResult::error(ExitCodes::NO_RESPONSE, "No response"),
        (None, Some(_)) if !result.checksum_valid => {
            CliResult::error(ExitCodes::CHECKSUM_FAILED, "Reply failed its checksum")
        }
        (None, Some(_)) => CliResult::success(),
    })
}

async fn scan(cli: &Cli, config: &AppConfig) -> anyhow::Result<CliResult> {
    let (session, logger) = open_session(cli, config)?;
    let link = link_config(cli, config);
    if let Err(e) = session.connect(link).await {
        return Ok(CliResult::from(&e));
    }

    let interrupt = CancellationToken::new();
    let handler_token = interrupt.clone();
    ctrlc::set_handler(move || handler_token.cancel()).context("installing Ctrl+C handler")?;

    let mut events = session.subscribe();
    let handle = match session.start_scan(config.scan.request()).await {
        Ok(ScanStart::Started(handle)) => handle,
        Ok(ScanStart::CancelRequested) => {
            return Ok(CliResult::error(ExitCodes::INTERNAL_ERROR, "A scan was already running"))
        }
        Err(e) => return Ok(CliResult::from(&e)),
    };
    let scan_id = handle.id();
    let policy = config.scan.no_response;

    let mut stopping = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::ScanOutcome(outcome)) => {
                    if cli.format == OutputFormat::Text && !cli.quiet {
                        print_outcome(&outcome, policy);
                    }
                }
                Ok(SessionEvent::ScanFinished { id, .. }) if id == scan_id => break,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            () = interrupt.cancelled(), if !stopping => {
                stopping = true;
                tracing::info!("Interrupted; stopping scan");
                session.stop_scan().await;
            }
        }
    }

    let report = match handle.wait().await {
        Ok(report) => report,
        Err(e) => return Ok(CliResult::from(&e)),
    };
    session.disconnect().await.ok();
    logger.lock().flush();

    if cli.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    let summary = format!(
        "Scan {:?}: {} of {} address(es) in {:.2}s",
        report.state,
        report.outcomes.iter().filter(|o| o.address().is_some()).count(),
        report.session.count,
        report.elapsed.as_secs_f64()
    );
    Ok(match report.state {
        ScanState::Cancelled => CliResult::cancelled(summary),
        ScanState::Faulted => CliResult::error(ExitCodes::TRANSPORT_ERROR, summary),
        _ => CliResult::success_with_message(summary),
    })
}

fn print_outcome(outcome: &RegisterOutcome, policy: NoResponseLogging) {
    if let Some(entry) = outcome.log_entry(policy) {
        println!("{}", entry.text);
    }
}

fn show_info(cli: &Cli) -> anyhow::Result<CliResult> {
    let config_file = regprobe_core::config::config_file();
    let info = serde_json::json!({
        "name": regprobe_core::NAME,
        "version": regprobe_core::VERSION,
        "platform": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
        "config_file": config_file.as_ref().map(|p| p.display().to_string()),
        "parities": ["none", "even", "odd", "mark", "space"],
    });

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&info)?),
        OutputFormat::Text => {
            println!("RegProbe v{}", regprobe_core::VERSION);
            println!("Platform: {} ({})", std::env::consts::OS, std::env::consts::ARCH);
            if let Some(path) = config_file {
                println!("Config: {}", path.display());
            }
            println!();
            println!("Function codes: 3 reads holding registers, others read input registers");
            println!("Parity: none, even, odd, mark, space");
        }
    }
    Ok(CliResult::success())
}
