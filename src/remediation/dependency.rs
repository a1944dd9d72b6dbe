use crate::error::DependencyError;
use crate::process;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tracing::info;

/// Shared infrastructure that can be restarted on behalf of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dependency {
    /// Network tunnel used by network-dependent services
    NetworkTunnel,
    /// Shared database server
    Database,
}

impl Dependency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dependency::NetworkTunnel => "network_tunnel",
            Dependency::Database => "database",
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Best-effort restart of shared dependencies
#[async_trait]
pub trait DependencyRemediator: Send + Sync {
    async fn restart(&self, dependency: Dependency) -> Result<(), DependencyError>;
}

/// Restarts dependencies by running configured commands
#[derive(Debug, Clone)]
pub struct CommandDependencyRemediator {
    network_tunnel: Option<Vec<String>>,
    database: Option<Vec<String>>,
    timeout: Duration,
}

impl CommandDependencyRemediator {
    pub fn new(
        network_tunnel: Option<Vec<String>>,
        database: Option<Vec<String>>,
        timeout: Duration,
    ) -> Self {
        Self {
            network_tunnel,
            database,
            timeout,
        }
    }

    fn command_for(&self, dependency: Dependency) -> Option<&[String]> {
        match dependency {
            Dependency::NetworkTunnel => self.network_tunnel.as_deref(),
            Dependency::Database => self.database.as_deref(),
        }
    }
}

#[async_trait]
impl DependencyRemediator for CommandDependencyRemediator {
    async fn restart(&self, dependency: Dependency) -> Result<(), DependencyError> {
        let command = self
            .command_for(dependency)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| DependencyError::NotConfigured(dependency.to_string()))?;

        info!("Restarting dependency {}", dependency);
        process::run_command(command, None, self.timeout)
            .await
            .map_err(|source| DependencyError::Command {
                dependency: dependency.to_string(),
                source,
            })?;

        info!("Dependency {} restarted", dependency);
        Ok(())
    }
}
