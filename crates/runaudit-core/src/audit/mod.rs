//! Periodic failure-rate audit
//!
//! One audit fetches the runs for the lookback window, computes the share of
//! runs that failed to find a load, and emails an alert when that share is
//! above the threshold. Every invocation ends in an [`AuditOutcome`]; errors
//! never escape a run.

mod alerter;
mod calculator;

pub use alerter::ThresholdAlerter;
pub use calculator::FailureRateCalculator;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::AuditConfig;
use crate::email::EmailDispatcher;
use crate::error::{Error, Result};
use crate::models::{AuditOutcome, AuditWindow};
use crate::platform::RunSource;

/// Scheduler identity of the recurring audit
pub const AUDIT_JOB_ID: &str = "failure_rate_audit";

/// Runs the audit routine against a run source and an email dispatcher
pub struct Auditor {
    source: Arc<dyn RunSource>,
    dispatcher: EmailDispatcher,
    calculator: FailureRateCalculator,
    alerter: ThresholdAlerter,
    lookback: chrono::Duration,
    page_limit: u32,
}

impl Auditor {
    /// Create a new auditor
    pub fn new(
        config: &AuditConfig,
        recipient: &str,
        source: Arc<dyn RunSource>,
        dispatcher: EmailDispatcher,
    ) -> Result<Self> {
        let lookback = chrono::Duration::from_std(config.lookback)
            .map_err(|e| Error::config(format!("lookback out of range: {e}")))?;

        Ok(Self {
            source,
            dispatcher,
            calculator: FailureRateCalculator::new(&config.marker_field, &config.marker_value),
            alerter: ThresholdAlerter::new(
                config.threshold,
                recipient,
                &config.subject,
                config.lookback,
            ),
            lookback,
            page_limit: config.page_limit,
        })
    }

    /// Run one audit over the window ending now
    pub async fn run(&self) -> AuditOutcome {
        let span = info_span!("audit", run_id = %Uuid::new_v4());
        self.run_at(Utc::now()).instrument(span).await
    }

    /// Run one audit over the window ending at `now`
    pub async fn run_at(&self, now: DateTime<Utc>) -> AuditOutcome {
        let window = AuditWindow::ending_at(now, self.lookback);
        info!(start = %window.start_param(), "Running audit");

        let page = match self.source.fetch_runs(&window, self.page_limit).await {
            Ok(page) => page,
            Err(e) => {
                error!(error = %e, "Failed to fetch runs, skipping audit");
                return AuditOutcome::FetchFailed {
                    error: e.to_string(),
                };
            }
        };

        info!(count = page.data.len(), "Fetched runs");
        for run in &page.data {
            debug!(
                run_id = %run.id_display(),
                status = run.status.as_deref().unwrap_or("unknown"),
                failed = self.calculator.is_failed(run),
                "Run"
            );
        }

        let Some(result) = self.calculator.compute(&page.data) else {
            warn!("No runs in audit window, nothing to evaluate");
            return AuditOutcome::NoData;
        };

        info!(
            total = result.total,
            failed = result.failed,
            ratio = result.ratio,
            "Computed failure ratio"
        );

        match self.alerter.alert(&result, &self.dispatcher).await {
            Ok(alert) => AuditOutcome::Completed { result, alert },
            Err(e) => AuditOutcome::DispatchFailed {
                result,
                error: e.to_string(),
            },
        }
    }
}
