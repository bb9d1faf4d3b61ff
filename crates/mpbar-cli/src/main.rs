mod demo;
mod progress;
mod style;
mod worker;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use mpbar_config::{ConfigError, MpbarConfig};
use mpbar_core::{ProgressError, WatcherSettings};

use crate::demo::{DemoOptions, Mode};
use crate::progress::BarFactory;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("MPBAR_GIT_HASH"),
    " ",
    env!("MPBAR_BUILD_DATE"),
    ")"
);

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid bar template: {0}")]
    Template(String),
    #[error("failed to launch worker process: {0}")]
    Launch(std::io::Error),
    #[error("worker {index} failed: {reason}")]
    Worker { index: usize, reason: String },
    #[error("invalid proxy: {0}")]
    Proxy(serde_json::Error),
}

#[derive(Parser)]
#[command(name = "mpbar", version, long_version = LONG_VERSION)]
struct Cli {
    /// Path to an mpbar.toml (defaults to ./mpbar.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log verbosity; RUST_LOG overrides it
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Warn)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum LogLevel {
    None,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Draw nested bars fed by a parallel pool
    Demo {
        /// Work items per stage
        #[arg(long, default_value_t = 100)]
        iterations: usize,

        /// Worker count (defaults to one per core)
        #[arg(long)]
        workers: Option<usize>,

        /// Run workers as threads or as child processes
        #[arg(long, value_enum, default_value_t = Mode::Threads)]
        mode: Mode,

        /// Upper bound of each item's simulated work
        #[arg(long, default_value_t = 100)]
        sleep_max_ms: u64,

        /// Make the map item with this index fail
        #[arg(long)]
        fail_at: Option<usize>,
    },

    /// Child-process entry point used by `demo --mode processes`
    #[command(hide = true)]
    Worker {
        /// Serialized progress proxy
        #[arg(long)]
        proxy: String,

        #[arg(long, default_value_t = 0)]
        sleep_ms: u64,

        #[arg(long)]
        fail: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    let result = match cli.command {
        Commands::Demo {
            iterations,
            workers,
            mode,
            sleep_max_ms,
            fail_at,
        } => {
            let options = DemoOptions {
                iterations,
                workers,
                mode,
                sleep_max_ms,
                fail_at,
            };
            run_demo(cli.config.as_deref(), &options)
        }
        Commands::Worker {
            proxy,
            sleep_ms,
            fail,
        } => worker::worker_main(&proxy, sleep_ms, fail),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", style::error_prefix());
            ExitCode::from(exit_code(&e))
        }
    }
}

fn run_demo(config_path: Option<&Path>, options: &DemoOptions) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let bars = BarFactory::new(&config.display)?;
    let settings = WatcherSettings::from(&config.watcher);

    let summary = demo::run(options, &bars, settings)?;
    for bar in &summary.bars {
        let total = bar
            .total
            .map_or_else(|| "?".to_string(), |t| t.to_string());
        println!(
            "{} {}: {}/{}",
            style::check_mark(),
            style::bold(&bar.description),
            bar.completed,
            total
        );
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<MpbarConfig, CliError> {
    let config = match path {
        Some(path) => mpbar_config::load_file(path)?,
        None => mpbar_config::load(Path::new("."))?.unwrap_or_default(),
    };
    Ok(config)
}

fn init_logging(log_level: LogLevel) {
    let level = match log_level {
        LogLevel::None => return,
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };

    let env = env_logger::Env::default().filter_or("RUST_LOG", level);

    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(matches!(log_level, LogLevel::Debug | LogLevel::Trace))
        .init();
}

fn exit_code(err: &CliError) -> u8 {
    match err {
        CliError::Config(_) | CliError::Template(_) => 2,
        CliError::Worker { .. } | CliError::Launch(_) => 3,
        CliError::Progress(ProgressError::InvalidArgument(_)) | CliError::Proxy(_) => 4,
        CliError::Progress(_) => 1,
    }
}
