//! Task execution core: executor, admission gate, scheduler and the
//! service that ties them together.

pub mod cache;
pub mod executor;
pub mod gate;
pub mod queue;
pub mod scheduler;
pub mod service;
pub mod slots;

#[cfg(test)]
pub(crate) mod testing;

pub use executor::{ExecutionResult, TaskExecutor, Verdict};
pub use gate::{AdmissionGate, GateStats};
pub use scheduler::{ArmedJob, Scheduler};
pub use service::{SchedulerService, ServiceStatus};
