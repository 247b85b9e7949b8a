//! Interval scheduling with replace, coalesce and instance-cap semantics

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

type JobFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// How a job is scheduled
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// Registration identity; registering the same id replaces the job
    pub id: String,
    /// Time between triggers; the first trigger is one interval after start
    pub interval: Duration,
    /// Collapse several missed triggers into one catch-up run
    pub coalesce: bool,
    /// Runs allowed in flight at once
    pub max_instances: usize,
}

impl JobSpec {
    /// Coalescing job with a single instance
    pub fn new(id: impl Into<String>, interval: Duration) -> Self {
        Self {
            id: id.into(),
            interval,
            coalesce: true,
            max_instances: 1,
        }
    }

    /// Set coalescing of missed triggers
    #[must_use]
    pub fn coalesce(mut self, coalesce: bool) -> Self {
        self.coalesce = coalesce;
        self
    }

    /// Set the concurrent instance cap
    #[must_use]
    pub fn max_instances(mut self, max_instances: usize) -> Self {
        self.max_instances = max_instances.max(1);
        self
    }
}

/// Driver lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverState {
    /// No tickers are active
    Stopped,
    /// Tickers fire registered jobs
    Running,
}

#[derive(Default)]
struct JobStats {
    triggered: AtomicU64,
    started: AtomicU64,
    skipped: AtomicU64,
    completed: AtomicU64,
    last_started_at: Mutex<Option<DateTime<Utc>>>,
}

impl JobStats {
    fn record_start(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
        *self.last_started_at.lock() = Some(Utc::now());
    }
}

/// Point-in-time view of a registered job
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    /// Registration identity
    pub id: String,
    /// Time between triggers
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Whether missed triggers collapse into one run
    pub coalesce: bool,
    /// Concurrent instance cap
    pub max_instances: usize,
    /// Runs currently in flight
    pub running: usize,
    /// Triggers fired, manual attempts included
    pub triggered: u64,
    /// Triggers that started a run
    pub started: u64,
    /// Triggers dropped at the instance cap
    pub skipped: u64,
    /// Runs that finished
    pub completed: u64,
    /// When the latest run started
    pub last_started_at: Option<DateTime<Utc>>,
}

/// Run slot held for the duration of a manually started run
pub struct RunGuard {
    _permit: OwnedSemaphorePermit,
    stats: Arc<JobStats>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.stats.completed.fetch_add(1, Ordering::SeqCst);
    }
}

struct JobEntry {
    spec: JobSpec,
    job: JobFn,
    slots: Arc<Semaphore>,
    stats: Arc<JobStats>,
    ticker: Option<CancellationToken>,
}

impl JobEntry {
    fn status(&self) -> JobStatus {
        JobStatus {
            id: self.spec.id.clone(),
            interval: self.spec.interval,
            coalesce: self.spec.coalesce,
            max_instances: self.spec.max_instances,
            running: self.spec.max_instances - self.slots.available_permits(),
            triggered: self.stats.triggered.load(Ordering::SeqCst),
            started: self.stats.started.load(Ordering::SeqCst),
            skipped: self.stats.skipped.load(Ordering::SeqCst),
            completed: self.stats.completed.load(Ordering::SeqCst),
            last_started_at: *self.stats.last_started_at.lock(),
        }
    }

    fn spawn_ticker(&mut self, shutdown: &CancellationToken) {
        let token = shutdown.child_token();
        self.ticker = Some(token.clone());

        // Anchored here, not at the task's first poll
        let first = Instant::now() + self.spec.interval;
        tokio::spawn(tick_loop(
            first,
            self.spec.clone(),
            self.job.clone(),
            self.slots.clone(),
            self.stats.clone(),
            token,
        ));
    }

    fn cancel_ticker(&mut self) {
        if let Some(token) = self.ticker.take() {
            token.cancel();
        }
    }
}

struct DriverInner {
    state: DriverState,
    jobs: HashMap<String, JobEntry>,
    shutdown: CancellationToken,
}

/// Owned recurring-task driver with an explicit `start` / `stop` lifecycle
pub struct TaskDriver {
    inner: Mutex<DriverInner>,
}

impl TaskDriver {
    /// Create a stopped driver with no jobs
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(DriverInner {
                state: DriverState::Stopped,
                jobs: HashMap::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Register `job` under `spec.id`, replacing any job with the same id.
    ///
    /// When the driver is running the new job's ticker starts immediately.
    pub fn register<F, Fut>(&self, mut spec: JobSpec, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        spec.max_instances = spec.max_instances.max(1);
        let job: JobFn = Arc::new(move || job().boxed());
        let mut inner = self.inner.lock();

        // In-flight runs of a replaced job keep counting against the cap
        let slots = match inner.jobs.remove(&spec.id) {
            Some(mut previous) => {
                info!(job_id = %spec.id, "Replacing existing job registration");
                previous.cancel_ticker();
                if previous.spec.max_instances == spec.max_instances {
                    previous.slots
                } else {
                    Arc::new(Semaphore::new(spec.max_instances))
                }
            }
            None => Arc::new(Semaphore::new(spec.max_instances)),
        };

        info!(
            job_id = %spec.id,
            interval = %humantime::format_duration(spec.interval),
            coalesce = spec.coalesce,
            max_instances = spec.max_instances,
            "Job registered"
        );

        let mut entry = JobEntry {
            spec,
            job,
            slots,
            stats: Arc::new(JobStats::default()),
            ticker: None,
        };

        if inner.state == DriverState::Running {
            let shutdown = inner.shutdown.clone();
            entry.spawn_ticker(&shutdown);
        }

        inner.jobs.insert(entry.spec.id.clone(), entry);
    }

    /// Start tickers for every registered job. Must be called within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state == DriverState::Running {
            return Err(Error::internal("task driver already running"));
        }

        let shutdown = CancellationToken::new();
        for entry in inner.jobs.values_mut() {
            entry.spawn_ticker(&shutdown);
        }
        inner.shutdown = shutdown;
        inner.state = DriverState::Running;

        info!(jobs = inner.jobs.len(), "Task driver started");
        Ok(())
    }

    /// Stop scheduling. Returns immediately; runs already in flight are not awaited.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        if inner.state == DriverState::Stopped {
            return;
        }

        inner.shutdown.cancel();
        for entry in inner.jobs.values_mut() {
            entry.ticker = None;
        }
        inner.state = DriverState::Stopped;

        info!("Task driver stopped");
    }

    /// Current lifecycle state
    pub fn state(&self) -> DriverState {
        self.inner.lock().state
    }

    /// Whether tickers are active
    pub fn is_running(&self) -> bool {
        self.state() == DriverState::Running
    }

    /// Number of registered jobs
    pub fn job_count(&self) -> usize {
        self.inner.lock().jobs.len()
    }

    /// Status of every job, ordered by id
    pub fn status(&self) -> Vec<JobStatus> {
        let inner = self.inner.lock();
        let mut statuses: Vec<JobStatus> = inner.jobs.values().map(JobEntry::status).collect();
        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        statuses
    }

    /// Claim a run slot of job `id` for a manual run, outside the ticker.
    ///
    /// Returns `Ok(None)` when the job is at its instance cap; the attempt is
    /// counted as a skipped trigger.
    pub fn try_acquire(&self, id: &str) -> Result<Option<RunGuard>> {
        let inner = self.inner.lock();
        let entry = inner
            .jobs
            .get(id)
            .ok_or_else(|| Error::internal(format!("no job registered as '{id}'")))?;

        entry.stats.triggered.fetch_add(1, Ordering::SeqCst);
        match entry.slots.clone().try_acquire_owned() {
            Ok(permit) => {
                entry.stats.record_start();
                Ok(Some(RunGuard {
                    _permit: permit,
                    stats: entry.stats.clone(),
                }))
            }
            Err(_) => {
                entry.stats.skipped.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        }
    }
}

impl Default for TaskDriver {
    fn default() -> Self {
        Self::new()
    }
}

async fn tick_loop(
    first: Instant,
    spec: JobSpec,
    job: JobFn,
    slots: Arc<Semaphore>,
    stats: Arc<JobStats>,
    token: CancellationToken,
) {
    let mut ticker = interval_at(first, spec.interval);
    ticker.set_missed_tick_behavior(if spec.coalesce {
        MissedTickBehavior::Skip
    } else {
        MissedTickBehavior::Burst
    });

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            _ = ticker.tick() => fire(&spec, &job, &slots, &stats),
        }
    }

    debug!(job_id = %spec.id, "Ticker stopped");
}

fn fire(spec: &JobSpec, job: &JobFn, slots: &Arc<Semaphore>, stats: &Arc<JobStats>) {
    stats.triggered.fetch_add(1, Ordering::SeqCst);

    let Ok(permit) = slots.clone().try_acquire_owned() else {
        stats.skipped.fetch_add(1, Ordering::SeqCst);
        warn!(
            job_id = %spec.id,
            max_instances = spec.max_instances,
            "Job still running, skipping this trigger"
        );
        return;
    };

    stats.record_start();
    debug!(job_id = %spec.id, "Job triggered");

    let run = job();
    let stats = stats.clone();
    tokio::spawn(async move {
        run.await;
        stats.completed.fetch_add(1, Ordering::SeqCst);
        drop(permit);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::sleep;

    fn counting(counter: Arc<AtomicUsize>) -> impl Fn() -> futures::future::Ready<()> + Send + Sync {
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reregistering_before_start_keeps_one_job() {
        let driver = TaskDriver::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        driver.register(JobSpec::new("audit", Duration::from_secs(10)), counting(first.clone()));
        driver.register(JobSpec::new("audit", Duration::from_secs(10)), counting(second.clone()));
        assert_eq!(driver.job_count(), 1);

        driver.start().unwrap();
        sleep(Duration::from_secs(15)).await;

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        driver.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reregistering_while_running_replaces_ticker() {
        let driver = TaskDriver::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        driver.register(JobSpec::new("audit", Duration::from_secs(10)), counting(first.clone()));
        driver.start().unwrap();

        sleep(Duration::from_secs(5)).await;
        driver.register(JobSpec::new("audit", Duration::from_secs(10)), counting(second.clone()));

        sleep(Duration::from_secs(8)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 0);

        sleep(Duration::from_secs(3)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(driver.job_count(), 1);
        driver.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_trigger_is_skipped() {
        let driver = TaskDriver::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        {
            let in_flight = in_flight.clone();
            let max_seen = max_seen.clone();
            driver.register(JobSpec::new("slow", Duration::from_secs(1)), move || {
                let in_flight = in_flight.clone();
                let max_seen = max_seen.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(2500)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
            });
        }

        driver.start().unwrap();
        sleep(Duration::from_millis(10_500)).await;

        let status = driver.status().remove(0);
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(status.triggered, 10);
        assert_eq!(status.started, 4);
        assert_eq!(status.skipped, 6);
        assert_eq!(status.started + status.skipped, status.triggered);
        assert_eq!(status.completed, 3);
        assert_eq!(status.running, 1);
        driver.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_missed_triggers_coalesce() {
        let driver = TaskDriver::new();
        let runs = Arc::new(AtomicUsize::new(0));
        driver.register(JobSpec::new("audit", Duration::from_secs(1)), counting(runs.clone()));
        driver.start().unwrap();

        tokio::time::advance(Duration::from_millis(5500)).await;
        sleep(Duration::from_millis(1)).await;

        assert_eq!(driver.status()[0].triggered, 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        sleep(Duration::from_secs(1)).await;
        assert_eq!(driver.status()[0].triggered, 2);
        driver.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_missed_triggers_burst_without_coalesce() {
        let driver = TaskDriver::new();
        let runs = Arc::new(AtomicUsize::new(0));
        driver.register(
            JobSpec::new("audit", Duration::from_secs(1)).coalesce(false),
            counting(runs.clone()),
        );
        driver.start().unwrap();

        tokio::time::advance(Duration::from_millis(5500)).await;
        sleep(Duration::from_millis(1)).await;

        assert_eq!(driver.status()[0].triggered, 5);
        driver.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_does_not_wait_for_in_flight_run() {
        let driver = TaskDriver::new();
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));

        {
            let started = started.clone();
            let finished = finished.clone();
            driver.register(JobSpec::new("audit", Duration::from_secs(1)), move || {
                let started = started.clone();
                let finished = finished.clone();
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    sleep(Duration::from_secs(3600)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                }
            });
        }

        driver.start().unwrap();
        sleep(Duration::from_millis(1500)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);

        driver.stop();
        assert_eq!(driver.state(), DriverState::Stopped);

        sleep(Duration::from_secs(10)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        assert_eq!(driver.status()[0].triggered, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_run_shares_instance_cap() {
        let driver = TaskDriver::new();
        driver.register(JobSpec::new("audit", Duration::from_secs(60)), || async {});

        let guard = driver.try_acquire("audit").unwrap();
        assert!(guard.is_some());
        assert!(driver.try_acquire("audit").unwrap().is_none());

        drop(guard);
        assert!(driver.try_acquire("audit").unwrap().is_some());

        let status = driver.status().remove(0);
        assert_eq!(status.triggered, 3);
        assert_eq!(status.skipped, 1);
        assert_eq!(status.completed, 2);
        assert!(driver.try_acquire("missing").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_instance_cap_is_clamped_to_one() {
        let driver = TaskDriver::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let spec = JobSpec {
            id: "audit".to_string(),
            interval: Duration::from_secs(1),
            coalesce: true,
            max_instances: 0,
        };
        driver.register(spec, counting(runs.clone()));
        driver.start().unwrap();

        sleep(Duration::from_millis(1500)).await;

        let status = driver.status().remove(0);
        assert_eq!(status.max_instances, 1);
        assert_eq!(status.skipped, 0);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        driver.stop();
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let driver = TaskDriver::new();
        driver.start().unwrap();
        assert!(driver.start().is_err());
        driver.stop();
        driver.stop();
        assert!(!driver.is_running());
    }
}
