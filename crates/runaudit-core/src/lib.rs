//! # RunAudit
//!
//! Scheduled failure-rate audit for platform call runs.
//!
//! Every interval RunAudit fetches the runs recorded by the platform over a
//! lookback window, computes the share of runs whose load lookup failed, and
//! emails an alert through a remote send-email function when that share
//! exceeds a threshold.
//!
//! ## Architecture
//!
//! - **Platform**: runs API client with bounded timeouts and retries
//! - **Audit**: failure-rate calculation and threshold alerting
//! - **Email**: payload construction and synchronous Lambda invocation
//! - **Scheduler**: recurring task driver (no overlap, coalesced misses)
//! - **API**: minimal HTTP shell for liveness and manual runs
//!
//! ## Quick Start
//!
//! ```bash
//! # Start the service (schedules the audit and serves HTTP)
//! runaudit serve
//!
//! # Run a single audit now
//! runaudit audit
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_precision_loss)]

pub mod api;
pub mod audit;
pub mod config;
pub mod email;
pub mod error;
pub mod models;
pub mod platform;
pub mod scheduler;
pub mod service;

pub use crate::config::Config;
pub use crate::error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::audit::{Auditor, AUDIT_JOB_ID};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
    pub use crate::scheduler::{JobSpec, TaskDriver};
    pub use crate::service::Service;
}
