//! Background job records.

use chrono::{DateTime, Utc};
use storekeep_core::{JobId, JobKind, JobStatus, ShopId};

/// A row of the job table.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub shop_id: Option<ShopId>,
    pub kind: JobKind,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    /// Attempts started so far, including the current one while running.
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub run_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Whether another failure would exhaust the job.
    #[must_use]
    pub const fn is_last_attempt(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// Job count grouped by kind and status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCount {
    pub kind: JobKind,
    pub status: JobStatus,
    pub count: i64,
}
