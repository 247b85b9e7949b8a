//! The RunAudit service
//!
//! Owns the task driver, the auditor and the HTTP server for the life of the
//! process: the audit is scheduled on startup and the driver is stopped on
//! shutdown without waiting for an in-flight audit.

use std::future::Future;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::api::{AppState, HttpServer};
use crate::audit::{Auditor, AUDIT_JOB_ID};
use crate::config::Config;
use crate::email::{EmailDispatcher, LambdaInvoker};
use crate::error::Result;
use crate::models::AuditOutcome;
use crate::platform::RunsClient;
use crate::scheduler::{JobSpec, TaskDriver};

/// The main service instance
pub struct Service {
    config: Config,
    driver: Arc<TaskDriver>,
    auditor: Arc<Auditor>,
}

impl Service {
    /// Build the production service: runs API client and Lambda-backed email
    pub async fn new(config: Config) -> Result<Self> {
        let source = Arc::new(RunsClient::new(&config.platform)?);
        let invoker = Arc::new(LambdaInvoker::new(&config.email).await);
        let dispatcher = EmailDispatcher::new(invoker, &config.email, &config.platform.org_id);
        let auditor = Auditor::new(&config.audit, &config.email.recipient, source, dispatcher)?;

        Ok(Self::from_parts(config, Arc::new(auditor)))
    }

    /// Assemble a service around an existing auditor
    pub fn from_parts(config: Config, auditor: Arc<Auditor>) -> Self {
        Self {
            config,
            driver: Arc::new(TaskDriver::new()),
            auditor,
        }
    }

    /// Get the auditor for direct runs
    pub fn auditor(&self) -> Arc<Auditor> {
        self.auditor.clone()
    }

    /// Get the task driver
    pub fn driver(&self) -> Arc<TaskDriver> {
        self.driver.clone()
    }

    /// Register the recurring audit, replacing any earlier registration
    pub fn schedule_audit(&self) {
        let auditor = self.auditor.clone();
        let spec = JobSpec::new(AUDIT_JOB_ID, self.config.audit.interval)
            .coalesce(true)
            .max_instances(1);

        self.driver.register(spec, move || {
            let auditor = auditor.clone();
            async move {
                let outcome = auditor.run().await;
                log_outcome(&outcome);
            }
        });
    }

    /// Schedule the audit and serve HTTP until Ctrl+C / SIGTERM
    pub async fn run(&self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Schedule the audit and serve HTTP until `signal` resolves.
    ///
    /// The driver is stopped as soon as `signal` fires, before in-flight
    /// HTTP requests are drained.
    pub async fn run_until<F>(&self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Starting RunAudit service...");

        self.schedule_audit();
        self.driver.start()?;

        let state = AppState {
            driver: self.driver.clone(),
            auditor: self.auditor.clone(),
        };
        let result = HttpServer::new(state)
            .serve(
                &self.config.server.addr(),
                stop_on(signal, self.driver.clone()),
            )
            .await;

        // No-op unless serving failed before the signal fired
        self.driver.stop();

        match &result {
            Ok(()) => info!("Service stopped"),
            Err(e) => error!(error = %e, "HTTP server error"),
        }
        result
    }
}

async fn stop_on<F>(signal: F, driver: Arc<TaskDriver>)
where
    F: Future<Output = ()>,
{
    signal.await;
    driver.stop();
}

/// Summarise how a scheduled audit ended
pub fn log_outcome(outcome: &AuditOutcome) {
    match outcome {
        AuditOutcome::Completed { result, alert } => info!(
            total = result.total,
            failed = result.failed,
            ratio = result.ratio,
            alerted = alert.is_some(),
            "Audit completed"
        ),
        AuditOutcome::NoData => info!("Audit completed with no runs in window"),
        AuditOutcome::FetchFailed { error } => {
            error!(error = %error, "Audit failed: runs could not be fetched");
        }
        AuditOutcome::DispatchFailed { result, error } => error!(
            ratio = result.ratio,
            error = %error,
            "Audit failed: alert email could not be sent"
        ),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Ctrl+C received, shutting down..."),
        () = terminate => info!("SIGTERM received, shutting down..."),
    }
}
