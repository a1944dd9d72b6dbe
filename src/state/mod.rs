//! Persistence for supervision state
//!
//! - `store`: per-service state records
//! - `instance`: single-instance guard for the supervisor process

pub mod instance;
pub mod store;

pub use instance::{read_instance, stop_instance, InstanceGuard};
pub use store::{FileStateStore, StateStore};
