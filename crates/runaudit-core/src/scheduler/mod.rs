//! Recurring task driver
//!
//! Runs registered jobs on fixed intervals inside the tokio runtime. Each
//! job has its own ticker task. A trigger that arrives while the job already
//! has `max_instances` runs in flight is skipped, never queued.

mod driver;

pub use driver::{DriverState, JobSpec, JobStatus, RunGuard, TaskDriver};
