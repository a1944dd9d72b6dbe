use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// How liveness of a service is determined
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LivenessCheck {
    /// Listed in the platform service registry (launchd) under `label`
    Registry { label: String },
    /// Recorded PID in `path` identifies a live process
    PidFile { path: PathBuf },
    /// A listener accepts TCP connections on `port`
    Port {
        port: u16,
        #[serde(default = "default_port_host")]
        host: String,
    },
}

fn default_port_host() -> String {
    "127.0.0.1".to_string()
}

impl LivenessCheck {
    pub fn as_str(&self) -> &'static str {
        match self {
            LivenessCheck::Registry { .. } => "registry",
            LivenessCheck::PidFile { .. } => "pid_file",
            LivenessCheck::Port { .. } => "port",
        }
    }
}

impl fmt::Display for LivenessCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LivenessCheck::Registry { label } => write!(f, "registry:{}", label),
            LivenessCheck::PidFile { path } => write!(f, "pid:{}", path.display()),
            LivenessCheck::Port { port, host } => write!(f, "port:{}:{}", host, port),
        }
    }
}

/// How a service is started and stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum ControlSpec {
    /// The service ships its own start/stop entry points (launchd wrapper
    /// scripts and the like); exit status 0 means success.
    Managed {
        start: Vec<String>,
        #[serde(default)]
        stop: Option<Vec<String>>,
    },
    /// A plain command launched detached by the supervisor, tracked by PID file
    BareProcess {
        command: Vec<String>,
        pid_file: PathBuf,
        #[serde(default)]
        log_file: Option<PathBuf>,
        #[serde(default)]
        working_dir: Option<PathBuf>,
    },
}

impl ControlSpec {
    /// Whether the service has an explicit stop path
    pub fn has_stop(&self) -> bool {
        match self {
            ControlSpec::Managed { stop, .. } => stop.is_some(),
            ControlSpec::BareProcess { .. } => true,
        }
    }
}

/// Shared infrastructure a service relies on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyTag {
    /// Needs the shared network tunnel to reach its upstream
    NetworkDependent,
}

/// Table whose newest timestamp tells how fresh a service's data is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessRef {
    pub table: String,
    pub timestamp_column: String,
}

/// Static description of one supervised service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    pub check: LivenessCheck,
    pub control: ControlSpec,
    #[serde(default)]
    pub tags: Vec<DependencyTag>,
    #[serde(default)]
    pub freshness: Option<FreshnessRef>,
}

impl ServiceDescriptor {
    pub fn is_network_dependent(&self) -> bool {
        self.tags.contains(&DependencyTag::NetworkDependent)
    }
}
