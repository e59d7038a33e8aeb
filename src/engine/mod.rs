//! The relay engine: sync, dispatch, drain, and the loop that drives them.

pub mod cycle;
pub mod dispatch;
pub mod drain;
pub mod sync;

pub use cycle::{CycleConfig, CycleReport, WorkHours, Worker};
pub use dispatch::{DispatchReport, Dispatcher, Disposition};
pub use drain::{DrainReport, QueueDrain, ReplayOutcome};
pub use sync::{SyncConfig, SyncEngine, SyncReport};
