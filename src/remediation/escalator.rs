//! Remediation ladder
//!
//! Picks one restart tier per cycle for a failed service and carries it out.
//! Attempts are capped per failure episode; once the cap is reached the
//! episode is exhausted and only probing and alerting continue.

use super::dependency::{Dependency, DependencyRemediator};
use crate::control::ServiceController;
use crate::domain::{ServiceDescriptor, ServiceState};
use crate::error::DependencyError;
use crate::probe::LivenessProber;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One rung of the ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    /// Restart the service itself
    RestartService,
    /// Restart the network tunnel, then the service
    RestartNetworkTunnel,
    /// Restart the database, then the service
    RestartDatabase,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::RestartService => "restart_service",
            Tier::RestartNetworkTunnel => "restart_network_tunnel",
            Tier::RestartDatabase => "restart_database",
        }
    }

    /// Dependency restarted before the service, if any
    pub fn dependency(&self) -> Option<Dependency> {
        match self {
            Tier::RestartService => None,
            Tier::RestartNetworkTunnel => Some(Dependency::NetworkTunnel),
            Tier::RestartDatabase => Some(Dependency::Database),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Gating thresholds for the ladder
#[derive(Debug, Clone)]
pub struct EscalationPolicy {
    /// Attempts allowed per episode across all tiers (default: 3)
    pub max_attempts: u32,
    /// Failure duration after which the tunnel tier opens (default: 300s)
    pub network_after: Duration,
    /// Tunnel tier only while attempts are below this (default: 2)
    pub network_max_attempts: u32,
    /// Failure duration after which the database tier opens (default: 600s)
    pub database_after: Duration,
    /// Wait after a dependency restart before restarting the service (default: 30s)
    pub dependency_settle: Duration,
    /// Wait after a service restart before re-probing (default: 5s)
    pub restart_settle: Duration,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            network_after: Duration::from_secs(300),
            network_max_attempts: 2,
            database_after: Duration::from_secs(600),
            dependency_settle: Duration::from_secs(30),
            restart_settle: Duration::from_secs(5),
        }
    }
}

impl EscalationPolicy {
    /// Choose the most invasive tier currently eligible, or `None` when the
    /// episode is exhausted.
    pub fn next_tier(
        &self,
        service: &ServiceDescriptor,
        attempts: u32,
        failure_duration: Duration,
    ) -> Option<Tier> {
        if failure_duration > self.database_after && attempts < self.max_attempts {
            return Some(Tier::RestartDatabase);
        }

        if service.is_network_dependent()
            && failure_duration > self.network_after
            && attempts < self.network_max_attempts
        {
            return Some(Tier::RestartNetworkTunnel);
        }

        if attempts < self.max_attempts {
            return Some(Tier::RestartService);
        }

        None
    }
}

/// What the escalator did this cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationOutcome {
    /// Service is not failed, nothing to do
    NotFailed,
    /// No tier left for this episode
    Exhausted { attempts: u32 },
    /// A tier ran; `recovered` is the re-probe verdict
    Attempted {
        tier: Tier,
        attempt: u32,
        recovered: bool,
    },
}

/// Runs the remediation ladder against real (or fake) collaborators
pub struct RemediationEscalator {
    policy: EscalationPolicy,
    controller: Arc<dyn ServiceController>,
    dependencies: Arc<dyn DependencyRemediator>,
    prober: Arc<dyn LivenessProber>,
}

impl RemediationEscalator {
    pub fn new(
        policy: EscalationPolicy,
        controller: Arc<dyn ServiceController>,
        dependencies: Arc<dyn DependencyRemediator>,
        prober: Arc<dyn LivenessProber>,
    ) -> Self {
        Self {
            policy,
            controller,
            dependencies,
            prober,
        }
    }

    pub fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }

    /// Perform at most one tier for a failed service.
    ///
    /// Increments `restart_attempts` for the tier taken. When the re-probe
    /// finds the service alive the episode is closed on `state`.
    pub async fn remediate(
        &self,
        service: &ServiceDescriptor,
        state: &mut ServiceState,
        now: DateTime<Utc>,
    ) -> RemediationOutcome {
        let Some(failure_duration) = state.failure_duration(now) else {
            return RemediationOutcome::NotFailed;
        };

        let attempts = state.restart_attempts();
        let Some(tier) = self.policy.next_tier(service, attempts, failure_duration) else {
            debug!(
                service = %service.id,
                "Remediation exhausted ({} attempts), waiting for recovery",
                attempts
            );
            return RemediationOutcome::Exhausted { attempts };
        };

        let attempt = attempts + 1;
        info!(
            service = %service.id,
            tier = %tier,
            "Remediation attempt #{} (down for {}s)",
            attempt,
            failure_duration.as_secs()
        );

        if let Some(dependency) = tier.dependency() {
            match self.dependencies.restart(dependency).await {
                Ok(()) => tokio::time::sleep(self.policy.dependency_settle).await,
                // Nothing was restarted, so nothing to wait for
                Err(DependencyError::NotConfigured(_)) => {
                    debug!(service = %service.id, "No restart command for {}", dependency);
                }
                Err(e) => {
                    warn!(service = %service.id, "Dependency restart failed: {}", e);
                    tokio::time::sleep(self.policy.dependency_settle).await;
                }
            }
        }

        if let Err(e) = self.controller.restart(service).await {
            warn!(service = %service.id, "Service restart failed: {}", e);
        }
        state.record_restart_attempt();

        tokio::time::sleep(self.policy.restart_settle).await;

        let recovered = self.prober.probe(service).await.is_alive();
        if recovered {
            info!(service = %service.id, tier = %tier, "Service recovered after remediation");
            state.observe_alive();
        } else {
            warn!(service = %service.id, tier = %tier, "Service still down after remediation");
        }

        RemediationOutcome::Attempted {
            tier,
            attempt,
            recovered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ControlSpec, DependencyTag, LivenessCheck};
    use crate::error::ControlError;
    use crate::probe::Liveness;
    use crate::remediation::CommandDependencyRemediator;
    use async_trait::async_trait;

    struct AlwaysDown;

    #[async_trait]
    impl LivenessProber for AlwaysDown {
        async fn probe(&self, _service: &ServiceDescriptor) -> Liveness {
            Liveness::Dead
        }
    }

    struct NoopController;

    #[async_trait]
    impl ServiceController for NoopController {
        async fn start(&self, _service: &ServiceDescriptor) -> Result<(), ControlError> {
            Ok(())
        }

        async fn stop(&self, _service: &ServiceDescriptor) -> Result<(), ControlError> {
            Ok(())
        }
    }

    fn service(network: bool) -> ServiceDescriptor {
        ServiceDescriptor {
            id: "feed".into(),
            description: None,
            check: LivenessCheck::Port {
                port: 9000,
                host: "127.0.0.1".into(),
            },
            control: ControlSpec::Managed {
                start: vec!["true".into()],
                stop: None,
            },
            tags: if network {
                vec![DependencyTag::NetworkDependent]
            } else {
                vec![]
            },
            freshness: None,
        }
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_fresh_failure_restarts_service() {
        let policy = EscalationPolicy::default();
        assert_eq!(
            policy.next_tier(&service(true), 0, secs(0)),
            Some(Tier::RestartService)
        );
    }

    #[test]
    fn test_network_tier_gating() {
        let policy = EscalationPolicy::default();

        // Not tagged
        assert_eq!(
            policy.next_tier(&service(false), 1, secs(301)),
            Some(Tier::RestartService)
        );
        // Exactly at the threshold is not past it
        assert_eq!(
            policy.next_tier(&service(true), 1, secs(300)),
            Some(Tier::RestartService)
        );
        assert_eq!(
            policy.next_tier(&service(true), 1, secs(301)),
            Some(Tier::RestartNetworkTunnel)
        );
        // Too many attempts for the tunnel tier
        assert_eq!(
            policy.next_tier(&service(true), 2, secs(400)),
            Some(Tier::RestartService)
        );
    }

    #[test]
    fn test_database_tier_gating() {
        let policy = EscalationPolicy::default();

        assert_eq!(
            policy.next_tier(&service(false), 2, secs(600)),
            Some(Tier::RestartService)
        );
        assert_eq!(
            policy.next_tier(&service(false), 2, secs(601)),
            Some(Tier::RestartDatabase)
        );
        assert_eq!(
            policy.next_tier(&service(true), 0, secs(900)),
            Some(Tier::RestartDatabase)
        );
    }

    #[test]
    fn test_attempt_cap() {
        let policy = EscalationPolicy::default();
        for duration in [0, 301, 601, 5000] {
            assert_eq!(policy.next_tier(&service(true), 3, secs(duration)), None);
        }
    }

    #[test]
    fn test_tier_dependency() {
        assert_eq!(Tier::RestartService.dependency(), None);
        assert_eq!(
            Tier::RestartNetworkTunnel.dependency(),
            Some(Dependency::NetworkTunnel)
        );
        assert_eq!(Tier::RestartDatabase.dependency(), Some(Dependency::Database));
    }

    #[tokio::test]
    async fn test_unconfigured_dependency_skips_settle() {
        let policy = EscalationPolicy {
            dependency_settle: secs(30),
            restart_settle: Duration::ZERO,
            ..EscalationPolicy::default()
        };
        let escalator = RemediationEscalator::new(
            policy,
            Arc::new(NoopController),
            Arc::new(CommandDependencyRemediator::new(None, None, secs(5))),
            Arc::new(AlwaysDown),
        );

        let since = Utc::now();
        let mut state = ServiceState::new();
        state.observe_dead(since);
        state.record_restart_attempt();

        let now = since + chrono::Duration::seconds(301);
        let outcome = tokio::time::timeout(secs(5), escalator.remediate(&service(true), &mut state, now))
            .await
            .expect("settle wait was not skipped");

        assert_eq!(
            outcome,
            RemediationOutcome::Attempted {
                tier: Tier::RestartNetworkTunnel,
                attempt: 2,
                recovered: false,
            }
        );
        assert_eq!(state.restart_attempts(), 2);
    }
}
