//! Liveness probing
//!
//! One bounded check per service, dispatched on the descriptor's
//! [`LivenessCheck`] variant. Anything inconclusive counts as dead.

pub mod registry;

use crate::domain::{LivenessCheck, ServiceDescriptor};
use crate::error::ProbeError;
use crate::process::{self, is_process_alive, read_pid_file, remove_pid_file};
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Probe verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Dead,
}

impl Liveness {
    pub fn is_alive(&self) -> bool {
        matches!(self, Liveness::Alive)
    }
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Liveness::Alive => write!(f, "alive"),
            Liveness::Dead => write!(f, "dead"),
        }
    }
}

impl From<bool> for Liveness {
    fn from(alive: bool) -> Self {
        if alive {
            Liveness::Alive
        } else {
            Liveness::Dead
        }
    }
}

/// Answers "is this service alive?"
#[async_trait]
pub trait LivenessProber: Send + Sync {
    async fn probe(&self, service: &ServiceDescriptor) -> Liveness;
}

/// Prober backed by the real OS: registry listing, process table, TCP connect
#[derive(Debug, Clone)]
pub struct SystemProber {
    registry_command: Vec<String>,
    timeout: Duration,
}

impl SystemProber {
    pub fn new(registry_command: Vec<String>, timeout: Duration) -> Self {
        Self {
            registry_command,
            timeout,
        }
    }

    /// Run the check without collapsing errors into `Dead`
    pub async fn check(&self, service: &ServiceDescriptor) -> Result<Liveness, ProbeError> {
        let fut = async {
            match &service.check {
                LivenessCheck::Registry { label } => self.check_registry(label).await,
                LivenessCheck::PidFile { path } => check_pid_file(path),
                LivenessCheck::Port { port, host } => Ok(check_port(host, *port).await),
            }
        };

        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout.as_secs()))?
    }

    async fn check_registry(&self, label: &str) -> Result<Liveness, ProbeError> {
        let output = process::run_command(&self.registry_command, None, self.timeout).await?;
        Ok(registry::is_listed(&output.stdout, label).into())
    }
}

#[async_trait]
impl LivenessProber for SystemProber {
    async fn probe(&self, service: &ServiceDescriptor) -> Liveness {
        match self.check(service).await {
            Ok(liveness) => {
                debug!(service = %service.id, check = %service.check, "probe: {}", liveness);
                liveness
            }
            Err(e) => {
                warn!(service = %service.id, "Probe inconclusive, treating as dead: {}", e);
                Liveness::Dead
            }
        }
    }
}

/// PID file check. A file naming a dead (or no) process is stale and removed.
pub fn check_pid_file(path: &Path) -> Result<Liveness, ProbeError> {
    let recorded = read_pid_file(path).map_err(|source| ProbeError::PidFile {
        path: path.to_path_buf(),
        source,
    })?;

    match recorded {
        None => Ok(Liveness::Dead),
        Some(Some(pid)) if is_process_alive(pid) => Ok(Liveness::Alive),
        Some(pid) => {
            info!(
                "Removing stale PID file {} (pid: {:?})",
                path.display(),
                pid
            );
            remove_pid_file(path);
            Ok(Liveness::Dead)
        }
    }
}

/// Port check: a successful TCP connect means something is listening
async fn check_port(host: &str, port: u16) -> Liveness {
    match TcpStream::connect((host, port)).await {
        Ok(_) => Liveness::Alive,
        Err(e) => {
            debug!("Connect to {}:{} failed: {}", host, port, e);
            Liveness::Dead
        }
    }
}
