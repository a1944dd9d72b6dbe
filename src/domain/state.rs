use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Supervision status of one service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Not probed yet since the record was created
    #[default]
    Unknown,
    Running,
    Failed,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Unknown => "unknown",
            ServiceStatus::Running => "running",
            ServiceStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a probe result did to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Unknown -> Running
    Started,
    /// Running -> Running
    StillRunning,
    /// Running/Unknown -> Failed, a new failure episode begins
    Failed,
    /// Failed -> Failed
    StillFailed,
    /// Failed -> Running, the episode ended
    Recovered,
}

/// Mutable per-service bookkeeping, persisted after every poll.
///
/// Fields are only reachable through the transition methods so that
/// `failure_since` is set exactly while `status` is `Failed`, and the episode
/// counters are cleared exactly on recovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceState {
    status: ServiceStatus,
    failure_since: Option<DateTime<Utc>>,
    restart_attempts: u32,
    last_alert_at: Option<DateTime<Utc>>,
}

impl ServiceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ServiceStatus {
        self.status
    }

    pub fn failure_since(&self) -> Option<DateTime<Utc>> {
        self.failure_since
    }

    pub fn restart_attempts(&self) -> u32 {
        self.restart_attempts
    }

    pub fn last_alert_at(&self) -> Option<DateTime<Utc>> {
        self.last_alert_at
    }

    pub fn is_failed(&self) -> bool {
        self.status == ServiceStatus::Failed
    }

    /// Apply a successful probe
    pub fn observe_alive(&mut self) -> Transition {
        let transition = match self.status {
            ServiceStatus::Unknown => Transition::Started,
            ServiceStatus::Running => Transition::StillRunning,
            ServiceStatus::Failed => Transition::Recovered,
        };

        self.status = ServiceStatus::Running;
        self.failure_since = None;
        self.restart_attempts = 0;
        self.last_alert_at = None;

        transition
    }

    /// Apply a failed probe observed at `now`
    pub fn observe_dead(&mut self, now: DateTime<Utc>) -> Transition {
        if self.status == ServiceStatus::Failed {
            return Transition::StillFailed;
        }

        self.status = ServiceStatus::Failed;
        self.failure_since = Some(now);
        self.restart_attempts = 0;
        self.last_alert_at = None;

        Transition::Failed
    }

    /// How long the current episode has lasted; `None` when not failed.
    /// Clock skew never yields a negative duration.
    pub fn failure_duration(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.failure_since
            .map(|since| now.signed_duration_since(since).to_std().unwrap_or(Duration::ZERO))
    }

    pub fn record_restart_attempt(&mut self) {
        self.restart_attempts = self.restart_attempts.saturating_add(1);
    }

    pub fn record_alert(&mut self, now: DateTime<Utc>) {
        self.last_alert_at = Some(now);
    }

    /// Repair a record read from disk that breaks the status/failure_since pairing
    pub fn normalized(mut self, now: DateTime<Utc>) -> Self {
        match (self.status, self.failure_since) {
            (ServiceStatus::Failed, None) => {
                self.failure_since = Some(now);
            }
            (ServiceStatus::Failed, Some(_)) => {}
            (_, _) => {
                self.failure_since = None;
                self.restart_attempts = 0;
                self.last_alert_at = None;
            }
        }
        self
    }
}
