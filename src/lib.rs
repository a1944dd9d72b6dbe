pub mod alert;
pub mod cli;
pub mod config;
pub mod control;
pub mod domain;
pub mod error;
pub mod gap;
pub mod probe;
pub mod process;
pub mod remediation;
pub mod state;
pub mod supervisor;

pub use alert::{AlertDecision, AlertDispatcher, AlertPolicy, Mailer, SoundPlayer};
pub use config::AppConfig;
pub use control::{ServiceController, SystemController};
pub use domain::{ServiceDescriptor, ServiceState, ServiceStatus, Transition};
pub use error::{Result, VigilError};
pub use gap::{FreshnessSource, GapDetector};
pub use probe::{Liveness, LivenessProber, SystemProber};
pub use remediation::{EscalationPolicy, RemediationEscalator, RemediationOutcome, Tier};
pub use state::{FileStateStore, InstanceGuard, StateStore};
pub use supervisor::{Shutdown, ShutdownToken, SupervisionEvent, SupervisionLoop};
