//! Platform runs API access
//!
//! Fetches the runs recorded by the external platform over an audit window.

mod client;

pub use client::RunsClient;

use crate::error::Result;
use crate::models::{AuditWindow, RunsPage};

/// Source of run records for a window
#[async_trait::async_trait]
pub trait RunSource: Send + Sync {
    /// Fetch at most `limit` runs starting at the window's lower bound
    async fn fetch_runs(&self, window: &AuditWindow, limit: u32) -> Result<RunsPage>;
}
