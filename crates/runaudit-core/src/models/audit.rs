//! Audit data models

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// The `[start, end)` range an audit looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuditWindow {
    /// Inclusive lower bound
    pub start: DateTime<Utc>,
    /// Exclusive upper bound, the audit's "now"
    pub end: DateTime<Utc>,
}

impl AuditWindow {
    /// Window of `lookback` ending at `end`
    pub fn ending_at(end: DateTime<Utc>, lookback: Duration) -> Self {
        Self {
            start: end - lookback,
            end,
        }
    }

    /// Lower bound as sent to the runs API: UTC, whole seconds, `Z` suffix
    pub fn start_param(&self) -> String {
        self.start.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Failure counts for one audit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AuditResult {
    /// Runs in the window
    pub total: usize,
    /// Runs carrying the failure marker
    pub failed: usize,
    /// `failed / total`, always within [0, 1]
    pub ratio: f64,
}

impl AuditResult {
    /// Ratio as a percentage
    pub fn percentage(&self) -> f64 {
        self.ratio * 100.0
    }
}

/// Alert email about to be dispatched
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertMessage {
    /// Destination addresses
    pub recipients: Vec<String>,
    /// Subject line
    pub subject: String,
    /// Plain-text body
    pub body: String,
}

/// Acknowledgment returned after an email was handed off
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailAck {
    /// Always `true`; failures are errors
    pub success: bool,
    /// Human-readable confirmation
    pub message: String,
    /// Recipients the email was sent to
    pub email_addresses: Vec<String>,
}

/// How a single audit ended
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Runs were evaluated; `alert` is set when an email went out
    Completed {
        /// Failure counts
        result: AuditResult,
        /// Acknowledgment of the alert email, if one was sent
        alert: Option<EmailAck>,
    },
    /// The window held no runs, nothing to evaluate
    NoData,
    /// Runs could not be fetched
    FetchFailed {
        /// Fetch error text
        error: String,
    },
    /// The threshold was crossed but the email could not be sent
    DispatchFailed {
        /// Failure counts
        result: AuditResult,
        /// Dispatch error text
        error: String,
    },
}

impl AuditOutcome {
    /// Whether an alert email was sent
    pub fn alerted(&self) -> bool {
        matches!(self, Self::Completed { alert: Some(_), .. })
    }

    /// Computed result, if the run got that far
    pub fn result(&self) -> Option<&AuditResult> {
        match self {
            Self::Completed { result, .. } | Self::DispatchFailed { result, .. } => Some(result),
            Self::NoData | Self::FetchFailed { .. } => None,
        }
    }
}
