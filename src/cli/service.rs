//! Inspection and control commands
//!
//! vigil status     - Show supervisor and per-service state
//! vigil stop       - Stop the running supervisor
//! vigil services   - List configured services

use super::runtime;
use crate::alert::humanize_duration;
use crate::config::AppConfig;
use crate::domain::{ControlSpec, ServiceStatus};
use crate::error::VigilError;
use crate::probe::LivenessProber;
use crate::process::Termination;
use crate::state::{read_instance, stop_instance, FileStateStore, StateStore};
use anyhow::{bail, Result};
use chrono::Utc;
use std::time::Duration;

fn banner(title: &str) {
    println!("\n\x1b[36m╔══════════════════════════════════════════════════════════════╗\x1b[0m");
    println!("\x1b[36m║  {:<60}║\x1b[0m", title);
    println!("\x1b[36m╚══════════════════════════════════════════════════════════════╝\x1b[0m\n");
}

fn colored_status(status: ServiceStatus) -> String {
    match status {
        ServiceStatus::Running => format!("\x1b[32m{:<10}\x1b[0m", status),
        ServiceStatus::Failed => format!("\x1b[31m{:<10}\x1b[0m", status),
        ServiceStatus::Unknown => format!("\x1b[90m{:<10}\x1b[0m", status),
    }
}

pub async fn show_status(
    config: &AppConfig,
    probe: bool,
    test_sound: bool,
    test_email: bool,
) -> Result<()> {
    banner("Vigil Supervisor Status");

    match read_instance(&config.instance_path()) {
        Some(pid) => println!("  Supervisor: \x1b[32m● running\x1b[0m (PID: {})", pid),
        None => println!("  Supervisor: \x1b[90m○ stopped\x1b[0m"),
    }
    println!("  State dir:  {}\n", config.state_dir().display());

    let store = FileStateStore::new(config.state_dir());
    let prober = probe.then(|| runtime::build_prober(config));
    let now = Utc::now();

    println!(
        "  {:<20} {:<10} {:<10} {:<9} {:<20} {}",
        "SERVICE",
        "STATUS",
        "DOWN FOR",
        "ATTEMPTS",
        "LAST ALERT",
        if probe { "LIVE" } else { "" }
    );
    println!("  {}", "-".repeat(80));

    for service in &config.services {
        let state = match store.load(&service.id).await {
            Ok(state) => state.map(|s| s.normalized(now)).unwrap_or_default(),
            Err(e) => {
                println!("  {:<20} \x1b[33m⚠ unreadable state: {}\x1b[0m", service.id, e);
                continue;
            }
        };

        let down_for = state
            .failure_duration(now)
            .map(humanize_duration)
            .unwrap_or_else(|| "-".to_string());
        let last_alert = state
            .last_alert_at()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        let live = match &prober {
            Some(prober) => {
                if prober.probe(service).await.is_alive() {
                    "\x1b[32m● alive\x1b[0m".to_string()
                } else {
                    "\x1b[31m○ dead\x1b[0m".to_string()
                }
            }
            None => String::new(),
        };

        println!(
            "  {:<20} {} {:<10} {:<9} {:<20} {}",
            service.id,
            colored_status(state.status()),
            down_for,
            state.restart_attempts(),
            last_alert,
            live
        );
    }

    if config.services.is_empty() {
        println!("  \x1b[90m(no services configured)\x1b[0m");
    }

    if !(test_sound || test_email) {
        println!();
        return Ok(());
    }

    println!("\n  Self-tests:");
    println!("  {}", "-".repeat(80));
    let dispatcher = runtime::build_dispatcher(config);
    let mut failed = false;

    if test_sound {
        match dispatcher.self_test_sound().await {
            Ok(()) => println!("  \x1b[32m✓ sound\x1b[0m"),
            Err(e) => {
                println!("  \x1b[31m✗ sound: {}\x1b[0m", e);
                failed = true;
            }
        }
    }
    if test_email {
        match dispatcher.self_test_email().await {
            Ok(()) => println!(
                "  \x1b[32m✓ email\x1b[0m sent to {}",
                config.alert.recipient.as_deref().unwrap_or("-")
            ),
            Err(e) => {
                println!("  \x1b[31m✗ email: {}\x1b[0m", e);
                failed = true;
            }
        }
    }
    println!();

    if failed {
        bail!("notification self-test failed");
    }
    Ok(())
}

pub async fn stop_supervisor(config: &AppConfig, force: bool) -> Result<()> {
    let grace = Duration::from_secs(config.supervisor.stop_grace_secs);

    match stop_instance(&config.instance_path(), grace, force).await {
        Ok((pid, outcome)) => {
            match outcome {
                Termination::Graceful => {
                    println!("\x1b[32m✓ Supervisor stopped (PID: {})\x1b[0m", pid)
                }
                Termination::Forced => {
                    println!("\x1b[33m✓ Supervisor killed (PID: {})\x1b[0m", pid)
                }
                Termination::NotRunning => {
                    println!("\x1b[33m⚠ Supervisor already exited (PID: {})\x1b[0m", pid)
                }
            }
            Ok(())
        }
        Err(VigilError::NotRunning) => {
            println!("\x1b[33m⚠ Supervisor is not running\x1b[0m");
            Ok(())
        }
        Err(e) => {
            println!("\x1b[31m✗ Failed to stop: {}\x1b[0m", e);
            Err(e.into())
        }
    }
}

pub fn list_services(config: &AppConfig) -> Result<()> {
    banner("Configured Services");

    if config.services.is_empty() {
        println!("  \x1b[90m(no services configured)\x1b[0m\n");
        return Ok(());
    }

    println!("  {:<20} {:<30} {:<14} {}", "SERVICE", "CHECK", "CONTROL", "DESCRIPTION");
    println!("  {}", "-".repeat(80));

    for service in &config.services {
        let control = match &service.control {
            ControlSpec::Managed { .. } => "managed",
            ControlSpec::BareProcess { .. } => "bare_process",
        };
        let mut description = service.description.clone().unwrap_or_default();
        if service.is_network_dependent() {
            description.push_str(" [network]");
        }
        if let Some(freshness) = &service.freshness {
            description.push_str(&format!(" [gap: {}]", freshness.table));
        }
        println!(
            "  {:<20} {:<30} {:<14} {}",
            service.id,
            service.check.to_string(),
            control,
            description.trim()
        );
    }
    println!();

    Ok(())
}
