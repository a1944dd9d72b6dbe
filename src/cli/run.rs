//! `vigil run`: the foreground supervision loop

use super::runtime;
use crate::config::AppConfig;
use crate::state::InstanceGuard;
use crate::supervisor::{install_signal_handlers, Shutdown};
use anyhow::{bail, Result};
use clap::Args;
use std::sync::Arc;
use tracing::info;

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Services to supervise (default: all)
    pub services: Vec<String>,

    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,

    /// Override the cycle interval in seconds
    #[arg(long)]
    pub interval: Option<u64>,
}

pub async fn run(mut config: AppConfig, args: RunArgs) -> Result<()> {
    if let Some(interval) = args.interval {
        if interval == 0 {
            bail!("--interval must be positive");
        }
        config.supervisor.interval_secs = interval;
    }

    let services = config.select_services(&args.services)?;
    if services.is_empty() {
        bail!("no services configured");
    }

    let mut guard = InstanceGuard::acquire(config.instance_path())?;

    let shutdown = Arc::new(Shutdown::new());
    install_signal_handlers(shutdown.clone());
    let token = shutdown.token();

    info!(
        "Supervising {} services: {}",
        services.len(),
        services
            .iter()
            .map(|s| s.id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut supervision = runtime::build_loop(&config, services);
    if args.once {
        supervision.run_cycle(&token).await;
    } else {
        supervision.run(token).await;
    }

    guard.release();
    info!("Supervisor exited");
    Ok(())
}
