use crate::alert::AlertPolicy;
use crate::domain::{ControlSpec, LivenessCheck, ServiceDescriptor};
use crate::error::{Result, VigilError};
use crate::gap;
use crate::remediation::EscalationPolicy;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub escalation: EscalationConfig,
    #[serde(default)]
    pub dependencies: DependenciesConfig,
    #[serde(default)]
    pub alert: AlertConfig,
    #[serde(default)]
    pub gap: GapConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Supervised services, in processing order
    #[serde(default)]
    pub services: Vec<ServiceDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Seconds between cycle starts (default: 300)
    pub interval_secs: u64,
    /// Directory for state records, the instance marker and gap markers
    pub state_dir: String,
    /// Upper bound on a single liveness probe (default: 10s)
    pub probe_timeout_secs: u64,
    /// Upper bound on a start/stop command (default: 60s)
    pub control_timeout_secs: u64,
    /// SIGTERM grace before SIGKILL (default: 10s)
    pub stop_grace_secs: u64,
    /// Wait after a restart before re-probing (default: 5s)
    pub restart_settle_secs: u64,
    /// Command listing the service registry
    pub registry_command: Vec<String>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            state_dir: "~/.vigil".to_string(),
            probe_timeout_secs: 10,
            control_timeout_secs: 60,
            stop_grace_secs: 10,
            restart_settle_secs: 5,
            registry_command: vec!["launchctl".to_string(), "list".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    pub max_attempts: u32,
    pub network_after_secs: u64,
    pub network_max_attempts: u32,
    pub database_after_secs: u64,
    pub dependency_settle_secs: u64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            network_after_secs: 300,
            network_max_attempts: 2,
            database_after_secs: 600,
            dependency_settle_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DependenciesConfig {
    /// Command restarting the shared network tunnel
    pub network_tunnel_restart: Option<Vec<String>>,
    /// Command restarting the database server
    pub database_restart: Option<Vec<String>>,
    pub timeout_secs: u64,
}

impl Default for DependenciesConfig {
    fn default() -> Self {
        Self {
            network_tunnel_restart: None,
            database_restart: None,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Failure duration before the first alert (default: 1800s)
    pub threshold_secs: u64,
    /// Minimum spacing between alerts (default: 1800s)
    pub repeat_secs: u64,
    /// Email recipient; email is skipped when unset
    pub recipient: Option<String>,
    /// Sound asset played on alert; speech is used when missing
    pub sound_file: Option<String>,
    pub player_command: Vec<String>,
    pub speech_command: Vec<String>,
    /// Upper bound on each delivery (default: 30s)
    pub timeout_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            threshold_secs: 1800,
            repeat_secs: 1800,
            recipient: None,
            sound_file: None,
            player_command: vec!["afplay".to_string()],
            speech_command: vec!["say".to_string()],
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GapConfig {
    pub enabled: bool,
    /// Gap above which data is stale (default: 7200s)
    pub threshold_secs: u64,
    /// Marker log; defaults to `<state_dir>/gap_markers.jsonl`
    pub markers_file: Option<String>,
    pub query_timeout_secs: u64,
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_secs: 7200,
            markers_file: None,
            query_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL; gap detection is off without it
    pub url: Option<String>,
    /// Maximum connections in pool
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    pub level: String,
    /// Enable JSON formatted logs
    pub json: bool,
    /// Directory for daily-rolling log files
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            dir: None,
        }
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_tilde(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

impl AppConfig {
    /// Load configuration from `config_dir` and the environment
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("supervisor.interval_secs", 300)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("VIGIL_ENV").unwrap_or_else(|_| "production".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (VIGIL__ALERT__RECIPIENT, etc.)
            .add_source(
                Environment::with_prefix("VIGIL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut config: AppConfig = builder.build()?.try_deserialize()?;
        config.expand_paths();
        Ok(config)
    }

    fn expand_paths(&mut self) {
        for service in &mut self.services {
            if let LivenessCheck::PidFile { path } = &mut service.check {
                *path = expand_tilde(&*path);
            }
            if let ControlSpec::BareProcess {
                pid_file,
                log_file,
                working_dir,
                ..
            } = &mut service.control
            {
                *pid_file = expand_tilde(&*pid_file);
                if let Some(log) = log_file {
                    *log = expand_tilde(&*log);
                }
                if let Some(dir) = working_dir {
                    *dir = expand_tilde(&*dir);
                }
            }
        }
    }

    pub fn state_dir(&self) -> PathBuf {
        expand_tilde(&self.supervisor.state_dir)
    }

    /// Instance marker of the running supervisor
    pub fn instance_path(&self) -> PathBuf {
        self.state_dir().join("supervisor.pid")
    }

    pub fn gap_markers_path(&self) -> PathBuf {
        match &self.gap.markers_file {
            Some(file) => expand_tilde(file),
            None => self.state_dir().join("gap_markers.jsonl"),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.supervisor.interval_secs)
    }

    pub fn escalation_policy(&self) -> EscalationPolicy {
        EscalationPolicy {
            max_attempts: self.escalation.max_attempts,
            network_after: Duration::from_secs(self.escalation.network_after_secs),
            network_max_attempts: self.escalation.network_max_attempts,
            database_after: Duration::from_secs(self.escalation.database_after_secs),
            dependency_settle: Duration::from_secs(self.escalation.dependency_settle_secs),
            restart_settle: Duration::from_secs(self.supervisor.restart_settle_secs),
        }
    }

    pub fn alert_policy(&self) -> AlertPolicy {
        AlertPolicy {
            threshold: Duration::from_secs(self.alert.threshold_secs),
            repeat_window: Duration::from_secs(self.alert.repeat_secs),
        }
    }

    /// Resolve service identifiers from the command line.
    ///
    /// No identifiers or `all` selects every service. Result keeps config order.
    pub fn select_services(&self, ids: &[String]) -> Result<Vec<ServiceDescriptor>> {
        if ids.is_empty() || ids.iter().any(|id| id == "all") {
            return Ok(self.services.clone());
        }

        for id in ids {
            if !self.services.iter().any(|s| &s.id == id) {
                return Err(VigilError::UnknownService(id.clone()));
            }
        }

        Ok(self
            .services
            .iter()
            .filter(|s| ids.contains(&s.id))
            .cloned()
            .collect())
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.supervisor.interval_secs == 0 {
            errors.push("supervisor.interval_secs must be positive".to_string());
        }
        if self.supervisor.registry_command.is_empty() {
            errors.push("supervisor.registry_command must not be empty".to_string());
        }
        if self.escalation.max_attempts == 0 {
            errors.push("escalation.max_attempts must be positive".to_string());
        }
        for (name, command) in [
            (
                "dependencies.network_tunnel_restart",
                &self.dependencies.network_tunnel_restart,
            ),
            ("dependencies.database_restart", &self.dependencies.database_restart),
        ] {
            if matches!(command, Some(argv) if argv.is_empty()) {
                errors.push(format!("{} must not be empty", name));
            }
        }
        if self.alert.speech_command.is_empty() {
            errors.push("alert.speech_command must not be empty".to_string());
        }

        let mut seen = HashSet::new();
        for service in &self.services {
            let id = &service.id;
            if id.is_empty() {
                errors.push("service id must not be empty".to_string());
                continue;
            }
            if !id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                errors.push(format!(
                    "service id '{}' may only contain letters, digits, '_' and '-'",
                    id
                ));
            }
            if id == "all" {
                errors.push("service id 'all' is reserved".to_string());
            }
            if !seen.insert(id.as_str()) {
                errors.push(format!("duplicate service id '{}'", id));
            }

            match &service.check {
                LivenessCheck::Registry { label } if label.trim().is_empty() => {
                    errors.push(format!("{}: registry label must not be empty", id));
                }
                LivenessCheck::Port { port: 0, .. } => {
                    errors.push(format!("{}: port must be non-zero", id));
                }
                _ => {}
            }

            match &service.control {
                ControlSpec::Managed { start, stop } => {
                    if start.is_empty() {
                        errors.push(format!("{}: start command must not be empty", id));
                    }
                    if matches!(stop, Some(argv) if argv.is_empty()) {
                        errors.push(format!("{}: stop command must not be empty", id));
                    }
                }
                ControlSpec::BareProcess { command, .. } => {
                    if command.is_empty() {
                        errors.push(format!("{}: command must not be empty", id));
                    }
                }
            }

            if let Some(freshness) = &service.freshness {
                if gap::validate_identifier(&freshness.table).is_err() {
                    errors.push(format!("{}: invalid table name '{}'", id, freshness.table));
                }
                if freshness.timestamp_column.contains('.')
                    || gap::validate_identifier(&freshness.timestamp_column).is_err()
                {
                    errors.push(format!(
                        "{}: invalid column name '{}'",
                        id, freshness.timestamp_column
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DependencyTag, FreshnessRef};

    const SAMPLE: &str = r#"
[supervisor]
interval_secs = 120
state_dir = "/var/lib/vigil"

[alert]
recipient = "oncall@example.com"

[dependencies]
network_tunnel_restart = ["tunnelctl", "restart"]

[[services]]
id = "trade_feed"
description = "Trade tape collector"
tags = ["network-dependent"]
check = { kind = "port", port = 9100 }
control = { style = "managed", start = ["launchctl", "start", "com.example.feed"] }
freshness = { table = "market.trades", timestamp_column = "ts" }

[[services]]
id = "book_sync"
check = { kind = "pid_file", path = "/tmp/book_sync.pid" }
control = { style = "bare_process", command = ["book-sync", "--live"], pid_file = "/tmp/book_sync.pid" }
"#;

    fn load_sample() -> AppConfig {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("default.toml"), SAMPLE).unwrap();
        AppConfig::load_from(dir.path()).unwrap()
    }

    fn managed(id: &str) -> ServiceDescriptor {
        ServiceDescriptor {
            id: id.to_string(),
            description: None,
            check: LivenessCheck::Registry {
                label: format!("com.example.{}", id),
            },
            control: ControlSpec::Managed {
                start: vec!["true".into()],
                stop: None,
            },
            tags: vec![],
            freshness: None,
        }
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.interval(), Duration::from_secs(300));
        assert_eq!(config.escalation_policy().max_attempts, 3);
        assert_eq!(config.alert_policy().threshold, Duration::from_secs(1800));
        assert_eq!(config.gap.threshold_secs, 7200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            "[[services]]\nid = \"feed\"\ncheck = { kind = \"telepathy\" }\n",
        )
        .unwrap();

        let err = AppConfig::load_from(dir.path()).unwrap_err();
        assert!(matches!(err, VigilError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let config = load_sample();
        assert_eq!(config.supervisor.interval_secs, 120);
        assert_eq!(config.instance_path(), PathBuf::from("/var/lib/vigil/supervisor.pid"));
        assert_eq!(
            config.gap_markers_path(),
            PathBuf::from("/var/lib/vigil/gap_markers.jsonl")
        );
        assert_eq!(config.alert.recipient.as_deref(), Some("oncall@example.com"));
        assert_eq!(config.alert.repeat_secs, 1800);

        assert_eq!(config.services.len(), 2);
        let feed = &config.services[0];
        assert_eq!(feed.tags, vec![DependencyTag::NetworkDependent]);
        assert_eq!(
            feed.check,
            LivenessCheck::Port {
                port: 9100,
                host: "127.0.0.1".into()
            }
        );
        assert_eq!(
            feed.freshness,
            Some(FreshnessRef {
                table: "market.trades".into(),
                timestamp_column: "ts".into()
            })
        );
        assert!(matches!(config.services[1].control, ControlSpec::BareProcess { .. }));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_expand_tilde() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/.vigil"), home.join(".vigil"));
        }
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
    }

    #[test]
    fn test_select_services() {
        let mut config = AppConfig::default();
        config.services = vec![managed("a"), managed("b"), managed("c")];

        let ids = |v: Vec<ServiceDescriptor>| v.into_iter().map(|s| s.id).collect::<Vec<_>>();

        assert_eq!(ids(config.select_services(&[]).unwrap()), vec!["a", "b", "c"]);
        assert_eq!(
            ids(config.select_services(&["all".into()]).unwrap()),
            vec!["a", "b", "c"]
        );
        // Config order wins over argument order
        assert_eq!(
            ids(config.select_services(&["c".into(), "a".into()]).unwrap()),
            vec!["a", "c"]
        );

        let err = config.select_services(&["nope".into()]).unwrap_err();
        assert!(matches!(err, VigilError::UnknownService(id) if id == "nope"));
    }

    #[test]
    fn test_validate_collects_all_problems() {
        let mut config = AppConfig::default();
        config.supervisor.interval_secs = 0;

        let mut bad_port = managed("feed");
        bad_port.check = LivenessCheck::Port {
            port: 0,
            host: "127.0.0.1".into(),
        };
        let mut bad_sql = managed("book");
        bad_sql.freshness = Some(FreshnessRef {
            table: "trades; drop".into(),
            timestamp_column: "ts".into(),
        });
        let mut empty_start = managed("empty");
        empty_start.control = ControlSpec::Managed {
            start: vec![],
            stop: None,
        };
        config.services = vec![bad_port, managed("feed"), bad_sql, empty_start];

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.iter().any(|e| e.contains("interval_secs")));
        assert!(errors.iter().any(|e| e.contains("duplicate service id 'feed'")));
        assert!(errors.iter().any(|e| e.contains("port must be non-zero")));
        assert!(errors.iter().any(|e| e.contains("invalid table name")));
        assert!(errors.iter().any(|e| e.contains("start command")));
    }
}
