use anyhow::{Context, Result};
use clap::Parser;
use gazelink::{GazelinkConfig, GazelinkOrchestrator, RunOptions};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "gazelink")]
#[command(about = "Gaze-tracking input client with calibration and dwell selection")]
#[command(version)]
#[command(long_about = "Streams camera frames to a gaze inference service over WebSocket, \
runs the nine-point calibration sequence, turns steady gaze into on-screen key selections \
and keeps the patient video stream connected with exponential backoff.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "gazelink.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH", help = "Write logs to a file in addition to the console")]
    log_file: Option<PathBuf>,

    #[arg(long, help = "Do not connect the patient video stream")]
    no_video: bool,

    #[arg(long, help = "Do not start camera, gaze tracking or dwell selection")]
    no_gaze: bool,

    #[arg(long, help = "Run the calibration sequence after connecting")]
    calibrate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        let rendered = toml::to_string_pretty(&GazelinkConfig::default())
            .context("Failed to render default configuration")?;
        println!("# Gazelink configuration file\n");
        println!("{}", rendered);
        return Ok(());
    }

    let log_guard = init_logging(&args)?;

    info!("Starting Gazelink v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = GazelinkConfig::load_from_file(&args.config).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    match config.validate() {
        Ok(()) if args.validate_config => {
            println!("✓ Configuration is valid");
            return Ok(());
        }
        Ok(()) => info!("Configuration loaded and validated"),
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            eprintln!("✗ Configuration validation failed: {}", e);
            std::process::exit(1);
        }
    }

    let options = RunOptions {
        video: !args.no_video,
        gaze: !args.no_gaze,
        calibrate: args.calibrate,
    };

    let mut orchestrator = GazelinkOrchestrator::new(config, options)
        .await
        .context("Failed to create orchestrator")?;

    orchestrator.initialize().await?;
    orchestrator.start().await.context("Failed to start")?;

    let exit_code = orchestrator.run().await.map_err(|e| {
        error!("System error during execution: {}", e);
        e
    })?;

    info!("Gazelink exited with code: {}", exit_code);

    // Flush buffered log lines before exiting
    drop(log_guard);
    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gazelink={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };
    let mut layers = vec![fmt_layer];

    let guard = match &args.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Invalid log file path: {}", path.display()))?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(fmt::layer().with_ansi(false).with_writer(writer).boxed());
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();

    Ok(guard)
}
