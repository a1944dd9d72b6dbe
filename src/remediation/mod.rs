//! Escalating remediation
//!
//! - Dependency remediators for shared infrastructure (tunnel, database)
//! - Escalator that walks the restart ladder for failed services

pub mod dependency;
pub mod escalator;

pub use dependency::{CommandDependencyRemediator, Dependency, DependencyRemediator};
pub use escalator::{EscalationPolicy, RemediationEscalator, RemediationOutcome, Tier};
