//! Supervisor Module
//!
//! Provides the supervision loop and its shutdown plumbing:
//! - `SupervisionLoop`: sequential probe/remediate/alert cycle
//! - `Shutdown` / `ShutdownToken`: cooperative cancellation driven by signals
//! - `Clock`: time source, read once per service

pub mod clock;
pub mod shutdown;
pub mod watchdog;

pub use clock::{Clock, SystemClock};
pub use shutdown::{install_signal_handlers, Shutdown, ShutdownSignal, ShutdownToken};
pub use watchdog::{SupervisionEvent, SupervisionLoop};
