//! Service start/stop control
//!
//! Two styles: managed services expose their own start/stop entry points,
//! bare processes are launched detached and tracked by PID file.

use crate::domain::{ControlSpec, ServiceDescriptor};
use crate::error::{CommandError, ControlError};
use crate::process::{self, read_pid_file, remove_pid_file, write_pid_file, Termination};
use async_trait::async_trait;
use std::fs::OpenOptions;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Issues start/stop against a managed service
#[async_trait]
pub trait ServiceController: Send + Sync {
    async fn start(&self, service: &ServiceDescriptor) -> Result<(), ControlError>;

    async fn stop(&self, service: &ServiceDescriptor) -> Result<(), ControlError>;

    /// Stop (when the service has a stop path) then start.
    /// A failed stop is logged and does not prevent the start.
    async fn restart(&self, service: &ServiceDescriptor) -> Result<(), ControlError> {
        if service.control.has_stop() {
            if let Err(e) = self.stop(service).await {
                warn!(service = %service.id, "Stop before restart failed: {}", e);
            }
        }
        self.start(service).await
    }
}

/// Controller that runs real commands and signals real processes
#[derive(Debug, Clone)]
pub struct SystemController {
    command_timeout: Duration,
    stop_grace: Duration,
}

impl SystemController {
    pub fn new(command_timeout: Duration, stop_grace: Duration) -> Self {
        Self {
            command_timeout,
            stop_grace,
        }
    }

    async fn spawn_detached(
        &self,
        service: &ServiceDescriptor,
        command: &[String],
        pid_file: &Path,
        log_file: Option<&Path>,
        working_dir: Option<&Path>,
    ) -> Result<(), ControlError> {
        let (program, args) = command
            .split_first()
            .ok_or(ControlError::Command(CommandError::Empty))?;

        // Already up: nothing to launch
        if let Ok(Some(Some(pid))) = read_pid_file(pid_file) {
            if process::is_process_alive(pid) {
                debug!(service = %service.id, "Process {} already running", pid);
                return Ok(());
            }
        }

        let mut cmd = Command::new(program);
        cmd.args(args).stdin(Stdio::null());

        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        match log_file {
            Some(path) => {
                let io_err = |source| ControlError::Io {
                    path: path.to_path_buf(),
                    source,
                };
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(io_err)?;
                }
                let log = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(io_err)?;
                let log_err = log.try_clone().map_err(io_err)?;
                cmd.stdout(Stdio::from(log)).stderr(Stdio::from(log_err));
            }
            None => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        // Own process group so terminal signals aimed at the supervisor skip it
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| {
            ControlError::Command(CommandError::Spawn {
                program: program.clone(),
                source,
            })
        })?;

        let pid = child.id().ok_or_else(|| ControlError::Signal {
            pid: 0,
            reason: "child exited before its PID was read".to_string(),
        })?;

        write_pid_file(pid_file, pid).map_err(|source| ControlError::Io {
            path: pid_file.to_path_buf(),
            source,
        })?;

        // Reap in the background so an exited child does not linger as a
        // zombie that still answers signal 0.
        let id = service.id.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => info!(service = %id, "Detached process {} exited: {}", pid, status),
                Err(e) => warn!(service = %id, "Failed waiting on process {}: {}", pid, e),
            }
        });

        info!(service = %service.id, "Started detached process (PID: {})", pid);
        Ok(())
    }

    async fn terminate_pid_file(
        &self,
        service: &ServiceDescriptor,
        pid_file: &Path,
    ) -> Result<(), ControlError> {
        let recorded = read_pid_file(pid_file).map_err(|source| ControlError::Io {
            path: pid_file.to_path_buf(),
            source,
        })?;

        let result = match recorded {
            Some(Some(pid)) => match process::terminate(pid, self.stop_grace, false).await {
                Ok(Termination::NotRunning) => {
                    debug!(service = %service.id, "Process {} was not running", pid);
                    Ok(())
                }
                Ok(Termination::Graceful) => {
                    info!(service = %service.id, "Stopped process {}", pid);
                    Ok(())
                }
                Ok(Termination::Forced) => {
                    warn!(service = %service.id, "Process {} killed after grace period", pid);
                    Ok(())
                }
                Err(reason) => Err(ControlError::Signal { pid, reason }),
            },
            _ => {
                debug!(service = %service.id, "No PID recorded, nothing to stop");
                Ok(())
            }
        };

        remove_pid_file(pid_file);
        result
    }
}

#[async_trait]
impl ServiceController for SystemController {
    async fn start(&self, service: &ServiceDescriptor) -> Result<(), ControlError> {
        match &service.control {
            ControlSpec::Managed { start, .. } => {
                process::run_command(start, None, self.command_timeout).await?;
                info!(service = %service.id, "Start command succeeded");
                Ok(())
            }
            ControlSpec::BareProcess {
                command,
                pid_file,
                log_file,
                working_dir,
            } => {
                self.spawn_detached(
                    service,
                    command,
                    pid_file,
                    log_file.as_deref(),
                    working_dir.as_deref(),
                )
                .await
            }
        }
    }

    async fn stop(&self, service: &ServiceDescriptor) -> Result<(), ControlError> {
        match &service.control {
            ControlSpec::Managed { stop: Some(stop), .. } => {
                process::run_command(stop, None, self.command_timeout).await?;
                info!(service = %service.id, "Stop command succeeded");
                Ok(())
            }
            ControlSpec::Managed { stop: None, .. } => {
                debug!(service = %service.id, "No stop path configured");
                Ok(())
            }
            ControlSpec::BareProcess { pid_file, .. } => {
                self.terminate_pid_file(service, pid_file).await
            }
        }
    }
}
