//! Core data model.
//!
//! An instance is a remote approval run. A task is one pending render/print
//! job derived from an instance reaching a status we care about.

pub mod instance;
pub mod task;

pub use instance::{FormValue, InstanceDetail, STATUS_COMPLETED, STATUS_TERMINATED};
pub use task::{DedupRecord, JobRecord, NewTask, QueuedTask};
