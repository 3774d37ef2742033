//! CLI entry point for subshrink
//!
//! Parses command line arguments, sets up logging and runs the daemon until
//! interrupted.

use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use subshrink::config::LoggingConfig;
use subshrink::{Config, Daemon, DaemonError};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// subshrink - extract subtitles from and re-encode newly downloaded videos
#[derive(Parser, Debug)]
#[command(name = "subshrink")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (config.toml); defaults apply when it is missing
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Monitored root directory, overriding watch.root
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Run a single scan pass and exit
    #[arg(long, default_value = "false")]
    once: bool,

    /// Skip startup checks (ffprobe, ffmpeg). For testing only.
    #[arg(long, default_value = "false")]
    skip_checks: bool,

    /// Exit without waiting for Enter after the loop stops
    #[arg(long, default_value = "false")]
    no_pause: bool,
}

/// Installs the stderr and file layers. The returned guard flushes the file on drop.
fn setup_logging(logging: &LoggingConfig) -> io::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let console_layer = fmt::layer().with_target(false).with_writer(io::stderr);

    let (file_layer, guard) = match logging.file_path() {
        Some(path) => {
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            let file_name = path
                .file_name()
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "log file has no name"))?;
            std::fs::create_dir_all(&dir)?;

            let (writer, guard) = non_blocking(rolling::never(&dir, file_name));
            let layer = fmt::layer()
                .with_writer(writer)
                .with_target(false)
                .with_ansi(false); // No ANSI colors in file
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    Ok(guard)
}

/// Loads the config file, falling back to defaults when it does not exist.
fn load_config(path: &Path, root: Option<PathBuf>) -> Result<(Config, bool), String> {
    let (mut config, from_file) =
        Config::load_or_default(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    if let Some(root) = root {
        config.watch.root = root;
        config
            .validate()
            .map_err(|e| format!("--root: {}", e))?;
    }
    Ok((config, from_file))
}

/// Blocks until the operator presses Enter.
fn wait_for_enter() {
    print!("Press Enter to exit...");
    let _ = io::stdout().flush();
    let mut line = String::new();
    let _ = io::stdin().lock().read_line(&mut line);
}

async fn run(args: &Args, config: Config) -> Result<(), DaemonError> {
    let daemon = if args.skip_checks {
        warn!("Skipping startup checks (--skip-checks enabled)");
        Daemon::new_without_checks(config)?
    } else {
        Daemon::new(config).await?
    };

    if args.once {
        let mut daemon = daemon;
        let summary = daemon.run_once().await?;
        info!(
            "Single pass done: {} candidates, {} new, {} with failures",
            summary.candidates, summary.new_files, summary.failed_files
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, stopping after the current pass");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                error!("Cannot listen for interrupts: {}", e);
                // Keep the sender alive so the loop keeps running
                std::future::pending::<()>().await;
            }
        }
    });

    daemon.run(shutdown_rx).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let (config, from_file) = match load_config(&args.config, args.root.clone()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let _guard = match setup_logging(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("subshrink starting...");
    if from_file {
        info!("Config file: {}", args.config.display());
    } else {
        info!("No config file at {}, using defaults", args.config.display());
    }

    let code = match run(&args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    };

    println!("Program terminated.");
    if !args.no_pause && !args.once {
        wait_for_enter();
    }
    code
}
