//! Data models for RunAudit

mod audit;
mod run;

pub use audit::*;
pub use run::*;
