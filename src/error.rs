use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the supervisor
#[derive(Error, Debug)]
pub enum VigilError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    #[error("Unknown service: {0}")]
    UnknownService(String),

    // Lifecycle errors
    #[error("Supervisor already running (PID: {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("Supervisor is not running")]
    NotRunning,

    // Component errors
    #[error(transparent)]
    Control(#[from] ControlError),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for VigilError
pub type Result<T> = std::result::Result<T, VigilError>;

/// Failure running an external command
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("empty command line")]
    Empty,

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` timed out after {timeout_secs}s")]
    Timeout { program: String, timeout_secs: u64 },

    #[error("`{program}` exited with {status}: {stderr}")]
    NonZeroExit {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("IO error talking to `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Inconclusive liveness probe; always treated as Dead
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0}s")]
    Timeout(u64),

    #[error("registry query failed: {0}")]
    Registry(#[from] CommandError),

    #[error("PID file {path}: {source}")]
    PidFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Start/stop invocation failure
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("control command failed: {0}")]
    Command(#[from] CommandError),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("process {pid} did not exit: {reason}")]
    Signal { pid: u32, reason: String },
}

/// Best-effort dependency restart failure
#[derive(Error, Debug)]
pub enum DependencyError {
    #[error("no restart command configured for {0}")]
    NotConfigured(String),

    #[error("restart of {dependency} failed: {source}")]
    Command {
        dependency: String,
        #[source]
        source: CommandError,
    },
}

/// Sound or mail delivery failure
#[derive(Error, Debug)]
pub enum AlertDeliveryError {
    #[error("sound playback failed: {0}")]
    Sound(#[source] CommandError),

    #[error("email not configured: {0}")]
    MailNotConfigured(String),

    #[error("email delivery failed: {0}")]
    Mail(#[source] CommandError),
}

/// State store read/write failure
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("state IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt state record {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not encode state: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Freshness query failure
#[derive(Error, Debug)]
pub enum GapError {
    #[error("invalid SQL identifier: {0}")]
    InvalidIdentifier(String),

    #[error("freshness query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("freshness query timed out after {0}s")]
    Timeout(u64),
}
