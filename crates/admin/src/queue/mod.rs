//! Background job queue on the `app.job` table.
//!
//! # Architecture
//!
//! - [`Queue`] is the cheap, cloneable handle request handlers use to enqueue
//!   work. It lives in [`AppState`].
//! - [`QueueManager`] runs `concurrency` worker tasks. Each claims the next
//!   due job with `FOR UPDATE SKIP LOCKED`, dispatches it to the
//!   [`JobHandler`] registered for its kind and records the outcome.
//! - Failed attempts are retried with exponential backoff and jitter until
//!   `max_attempts`; then the job is `dead` and waits for a manual retry.
//! - Workers stop on the shared [`CancellationToken`].
//!
//! # Example
//!
//! ```rust,ignore
//! state
//!     .queue()
//!     .enqueue(Some(shop.id), &ReportJob::for_month(Utc::now()), Duration::ZERO)
//!     .await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use sqlx::PgPool;
use storekeep_core::{JobKind, ShopId};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::QueueSettings;
use crate::db::{JobRepository, RepositoryError, ShopRepository};
use crate::models::{Job, Shop};
use crate::services::{EmailError, StorageError};
use crate::shopify::{AdminClient, AdminShopifyError};
use crate::state::AppState;

mod backoff;
pub mod jobs;

pub use backoff::Backoff;
pub use jobs::{EmailJob, ImageJob, ReportJob};

/// Longest a backoff may grow.
const MAX_BACKOFF: Duration = Duration::from_secs(60 * 60);

/// A job still `running` after this long is assumed to belong to a dead worker.
const LEASE: Duration = Duration::from_secs(15 * 60);

/// Queue tuning.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub poll_interval: Duration,
    /// Handler time limit and stale-job cutoff.
    pub lease: Duration,
}

impl From<&QueueSettings> for QueueConfig {
    fn from(settings: &QueueSettings) -> Self {
        Self {
            concurrency: settings.concurrency.max(1),
            max_attempts: settings.max_attempts.max(1),
            backoff: Backoff::new(settings.backoff, MAX_BACKOFF, 0.2),
            poll_interval: settings.poll_interval,
            lease: LEASE,
        }
    }
}

/// Errors enqueuing or managing jobs.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("failed to serialize job payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Why a job attempt failed.
#[derive(Debug, Error)]
pub enum JobError {
    /// The payload doesn't match the job kind; retrying can't help.
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// The job can never succeed (e.g., the shop uninstalled).
    #[error("{0}")]
    Permanent(String),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Shopify error: {0}")]
    Shopify(#[from] AdminShopifyError),

    #[error("email error: {0}")]
    Email(#[from] EmailError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("job exceeded its {0:?} time limit")]
    TimedOut(Duration),

    #[error("failed to enqueue follow-up job: {0}")]
    Queue(#[from] QueueError),
}

impl JobError {
    /// Whether another attempt could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Payload(_)
                | Self::Permanent(_)
                | Self::Email(EmailError::NotConfigured | EmailError::InvalidAddress(_))
                | Self::Shopify(
                    AdminShopifyError::UserErrors(_) | AdminShopifyError::Unauthorized(_)
                )
        )
    }

    /// Minimum wait requested by the remote side.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Shopify(AdminShopifyError::RateLimited(secs)) => {
                Some(Duration::from_secs(*secs))
            }
            _ => None,
        }
    }
}

/// A job payload type bound to its kind.
pub trait JobPayload: Serialize + DeserializeOwned {
    const KIND: JobKind;
}

/// Decode a job's payload.
///
/// # Errors
///
/// Returns `JobError::Payload` if the JSON doesn't match `P`.
pub fn decode<P: JobPayload>(job: &Job) -> Result<P, JobError> {
    Ok(serde_json::from_value(job.payload.clone())?)
}

/// Processes jobs of one kind.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn kind(&self) -> JobKind;

    async fn handle(&self, job: &Job, state: &AppState) -> Result<(), JobError>;
}

/// Load an installed shop and a client for it.
///
/// # Errors
///
/// Returns `Permanent` if the job has no shop or the shop is gone.
pub async fn shop_client(state: &AppState, job: &Job) -> Result<(Shop, AdminClient), JobError> {
    let shop_id = job
        .shop_id
        .ok_or_else(|| JobError::Permanent("job has no shop".to_string()))?;
    let shop = ShopRepository::new(state.pool())
        .get(shop_id)
        .await?
        .ok_or_else(|| JobError::Permanent(format!("shop {shop_id} not found")))?;
    let client = state
        .admin_client(&shop)
        .ok_or_else(|| JobError::Permanent(format!("shop {} is not installed", shop.domain)))?;
    Ok((shop, client))
}

/// When to run the next attempt after `error`, or `None` when the job is dead.
#[must_use]
pub fn next_attempt_at(
    job: &Job,
    error: &JobError,
    backoff: &Backoff,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if !error.is_retryable() || job.is_last_attempt() {
        return None;
    }
    let attempt = u32::try_from(job.attempts).unwrap_or(1);
    let delay = backoff.delay(attempt).max(error.retry_after().unwrap_or_default());
    let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
    Some(now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC))
}

/// Handle for enqueuing jobs.
#[derive(Debug, Clone)]
pub struct Queue {
    pool: PgPool,
    config: QueueConfig,
}

impl Queue {
    #[must_use]
    pub const fn new(pool: PgPool, config: QueueConfig) -> Self {
        Self { pool, config }
    }

    #[must_use]
    pub const fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Enqueue a typed payload to run after `delay`.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload can't be serialized or the insert fails.
    pub async fn enqueue<P: JobPayload>(
        &self,
        shop_id: Option<ShopId>,
        payload: &P,
        delay: Duration,
    ) -> Result<Job, QueueError> {
        self.enqueue_raw(P::KIND, shop_id, &serde_json::to_value(payload)?, delay)
            .await
    }

    /// Enqueue a payload of `kind` as raw JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn enqueue_raw(
        &self,
        kind: JobKind,
        shop_id: Option<ShopId>,
        payload: &serde_json::Value,
        delay: Duration,
    ) -> Result<Job, QueueError> {
        let run_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        let max_attempts = i32::try_from(self.config.max_attempts).unwrap_or(i32::MAX);

        let job = JobRepository::new(&self.pool)
            .enqueue(shop_id, kind, payload, run_at, max_attempts)
            .await?;

        info!(job = %job.id, %kind, "Job enqueued");
        Ok(job)
    }
}

/// Runs queue workers until shut down.
#[derive(Clone)]
pub struct QueueManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    state: AppState,
    handlers: HashMap<JobKind, Arc<dyn JobHandler>>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl QueueManager {
    /// Create a manager with the email, image and report handlers.
    #[must_use]
    pub fn new(state: AppState, shutdown: CancellationToken) -> Self {
        Self::with_handlers(state, shutdown, jobs::default_handlers())
    }

    #[must_use]
    pub fn with_handlers(
        state: AppState,
        shutdown: CancellationToken,
        handlers: Vec<Arc<dyn JobHandler>>,
    ) -> Self {
        let handlers = handlers.into_iter().map(|h| (h.kind(), h)).collect();
        Self {
            inner: Arc::new(ManagerInner {
                state,
                handlers,
                shutdown,
                tracker: TaskTracker::new(),
            }),
        }
    }

    /// Reset stale jobs, then spawn the worker tasks.
    ///
    /// # Errors
    ///
    /// Returns an error if stale jobs can't be reset.
    pub async fn start(&self) -> Result<(), QueueError> {
        let config = self.inner.state.queue().config().clone();
        let cutoff = Utc::now()
            - chrono::Duration::from_std(config.lease).unwrap_or_else(|_| chrono::Duration::zero());
        let requeued = JobRepository::new(self.inner.state.pool())
            .requeue_stale(cutoff)
            .await?;
        if requeued > 0 {
            warn!(requeued, "Reset jobs left running by a previous process");
        }

        for worker in 0..config.concurrency {
            let manager = self.clone();
            self.inner.tracker.spawn(
                async move { manager.run_worker().await }
                    .instrument(info_span!("queue_worker", worker)),
            );
        }
        info!(workers = config.concurrency, "Queue workers started");
        Ok(())
    }

    /// Stop claiming jobs and wait for in-flight ones to finish.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        info!("Queue workers stopped");
    }

    async fn run_worker(&self) {
        let state = &self.inner.state;
        let poll_interval = state.queue().config().poll_interval;
        let repo = JobRepository::new(state.pool());

        while !self.inner.shutdown.is_cancelled() {
            match repo.claim_next().await {
                Ok(Some(job)) => self.process(job).await,
                Ok(None) => self.idle(poll_interval).await,
                Err(e) => {
                    error!(error = %e, "Failed to claim job");
                    self.idle(poll_interval).await;
                }
            }
        }
    }

    async fn idle(&self, interval: Duration) {
        tokio::select! {
            () = self.inner.shutdown.cancelled() => {}
            () = tokio::time::sleep(interval) => {}
        }
    }

    async fn process(&self, job: Job) {
        let span = info_span!("job", job = %job.id, kind = %job.kind, attempt = job.attempts);
        self.process_in_span(job).instrument(span).await;
    }

    async fn process_in_span(&self, job: Job) {
        let state = &self.inner.state;
        let config = state.queue().config();
        let repo = JobRepository::new(state.pool());

        let result = match self.inner.handlers.get(&job.kind) {
            Some(handler) => tokio::time::timeout(config.lease, handler.handle(&job, state))
                .await
                .unwrap_or(Err(JobError::TimedOut(config.lease))),
            None => Err(JobError::Permanent(format!(
                "no handler registered for {}",
                job.kind
            ))),
        };

        let outcome = match result {
            Ok(()) => {
                debug!("Job completed");
                repo.complete(job.id).await
            }
            Err(e) => {
                let retry_at = next_attempt_at(&job, &e, &config.backoff, Utc::now());
                match retry_at {
                    Some(at) => warn!(error = %e, retry_at = %at, "Job failed, will retry"),
                    None => error!(error = %e, "Job failed permanently"),
                }
                repo.fail(job.id, &e.to_string(), retry_at).await
            }
        };

        if let Err(e) = outcome {
            error!(error = %e, "Failed to record job outcome");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use storekeep_core::{JobId, JobStatus};

    use super::*;

    fn job(attempts: i32, max_attempts: i32) -> Job {
        Job {
            id: JobId::new(1),
            shop_id: None,
            kind: JobKind::Email,
            payload: serde_json::json!({}),
            status: JobStatus::Running,
            attempts,
            max_attempts,
            last_error: None,
            run_at: Utc::now(),
            locked_at: Some(Utc::now()),
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn no_jitter() -> Backoff {
        Backoff::new(Duration::from_secs(2), Duration::from_secs(60), 0.0)
    }

    #[test]
    fn test_retry_schedules_backoff() {
        let now = Utc::now();
        let err = JobError::Repository(RepositoryError::NotFound);
        let at = next_attempt_at(&job(2, 5), &err, &no_jitter(), now).unwrap();
        assert_eq!(at - now, chrono::Duration::seconds(4));
    }

    #[test]
    fn test_last_attempt_is_dead() {
        let err = JobError::Repository(RepositoryError::NotFound);
        assert!(next_attempt_at(&job(5, 5), &err, &no_jitter(), Utc::now()).is_none());
    }

    #[test]
    fn test_permanent_errors_are_not_retried() {
        let err = JobError::Permanent("shop uninstalled".into());
        assert!(next_attempt_at(&job(1, 5), &err, &no_jitter(), Utc::now()).is_none());

        let err = JobError::Email(EmailError::NotConfigured);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_rate_limit_extends_delay() {
        let now = Utc::now();
        let err = JobError::Shopify(AdminShopifyError::RateLimited(30));
        let at = next_attempt_at(&job(1, 5), &err, &no_jitter(), now).unwrap();
        assert_eq!(at - now, chrono::Duration::seconds(30));
    }

    #[test]
    fn test_queue_config_from_settings() {
        let config = QueueConfig::from(&QueueSettings {
            concurrency: 0,
            max_attempts: 3,
            backoff: Duration::from_millis(500),
            poll_interval: Duration::from_secs(1),
        });
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.backoff.base, Duration::from_millis(500));
        assert_eq!(config.backoff.max, MAX_BACKOFF);
    }
}
