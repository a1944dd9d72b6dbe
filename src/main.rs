use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use tracing::error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use vigil::cli::{run, service, Cli, Commands};
use vigil::config::{expand_tilde, AppConfig, LoggingConfig};
use vigil::error::VigilError;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    let _log_guard = if cli.command.is_long_running() {
        init_logging(&config.logging)
    } else {
        init_logging_simple();
        None
    };

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("Config error: {}", e);
        }
        return Err(VigilError::InvalidConfig(errors).into());
    }

    match cli.command {
        Commands::Run(args) => run::run(config, args).await?,
        Commands::Stop { force } => service::stop_supervisor(&config, force).await?,
        Commands::Status {
            probe,
            test_sound,
            test_email,
        } => service::show_status(&config, probe, test_sound, test_email).await?,
        Commands::Services => service::list_services(&config)?,
    }

    Ok(())
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = level.trim();
        if level.is_empty() || level == "info" {
            EnvFilter::new("info,vigil=debug,sqlx=warn")
        } else if level.contains('=') || level.contains(',') {
            EnvFilter::new(level)
        } else {
            EnvFilter::new(format!("{},sqlx=warn", level))
        }
    })
}

/// Full logging for the supervisor: console (plain or JSON) plus an optional
/// daily-rolling file. The returned guard must outlive the runtime.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let mut guard = None;
    let file_layer = config.dir.as_ref().and_then(|dir| {
        let log_dir = expand_tilde(dir);
        // rolling::daily panics if it cannot create the file, so preflight writability
        match preflight_log_dir(&log_dir) {
            Ok(()) => {
                let file_appender = tracing_appender::rolling::daily(&log_dir, "vigil.log");
                let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
                guard = Some(worker_guard);
                eprintln!("Logging to: {}/vigil.log", log_dir.display());
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    log_dir.display(),
                    e
                );
                None
            }
        }
    });

    let json_layer = config
        .json
        .then(|| tracing_subscriber::fmt::layer().json().with_target(true));
    let console_layer = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
    });

    tracing_subscriber::registry()
        .with(build_filter(&config.level))
        .with(console_layer)
        .with(json_layer)
        .with(file_layer)
        .init();

    guard
}

fn preflight_log_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let test_path = dir.join(".vigil_write_test");
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&test_path)?;
    std::fs::remove_file(&test_path)
}

fn init_logging_simple() {
    // Minimal logging for CLI commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}
