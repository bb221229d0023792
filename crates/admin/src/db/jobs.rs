//! Background job table access.
//!
//! Workers claim rows with `FOR UPDATE SKIP LOCKED`, so any number of them
//! (in any number of processes) can poll the same table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use storekeep_core::{JobId, JobKind, JobStatus, ShopId};

use super::RepositoryError;
use crate::models::{Job, JobCount};

const JOB_COLUMNS: &str = "id, shop_id, kind, payload, status, attempts, max_attempts, last_error, \
     run_at, locked_at, completed_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct JobRow {
    id: i32,
    shop_id: Option<i32>,
    kind: JobKind,
    payload: serde_json::Value,
    status: JobStatus,
    attempts: i32,
    max_attempts: i32,
    last_error: Option<String>,
    run_at: DateTime<Utc>,
    locked_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Self {
            id: JobId::new(row.id),
            shop_id: row.shop_id.map(ShopId::new),
            kind: row.kind,
            payload: row.payload,
            status: row.status,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            last_error: row.last_error,
            run_at: row.run_at,
            locked_at: row.locked_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct JobCountRow {
    kind: JobKind,
    status: JobStatus,
    count: i64,
}

/// Repository for the job queue table.
#[derive(Clone, Copy)]
pub struct JobRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> JobRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a queued job due at `run_at`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn enqueue(
        &self,
        shop_id: Option<ShopId>,
        kind: JobKind,
        payload: &serde_json::Value,
        run_at: DateTime<Utc>,
        max_attempts: i32,
    ) -> Result<Job, RepositoryError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r"
            INSERT INTO app.job (shop_id, kind, payload, run_at, max_attempts)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {JOB_COLUMNS}
            "
        ))
        .bind(shop_id.map(|s| s.as_i32()))
        .bind(kind)
        .bind(payload)
        .bind(run_at)
        .bind(max_attempts)
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }

    /// Claim the next due job, marking it running and counting the attempt.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn claim_next(&self) -> Result<Option<Job>, RepositoryError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r"
            UPDATE app.job
            SET status = 'running', locked_at = NOW(), attempts = attempts + 1
            WHERE id = (
                SELECT id FROM app.job
                WHERE status IN ('queued', 'failed') AND run_at <= NOW()
                ORDER BY run_at, id
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING {JOB_COLUMNS}
            "
        ))
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn complete(&self, id: JobId) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE app.job
            SET status = 'completed', completed_at = NOW(), locked_at = NULL, last_error = NULL
            WHERE id = $1
            ",
        )
        .bind(id.as_i32())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// With `retry_at` the job becomes `failed` and is picked up again at that
    /// time; without it the job is `dead`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn fail(
        &self,
        id: JobId,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        let status = if retry_at.is_some() {
            JobStatus::Failed
        } else {
            JobStatus::Dead
        };
        sqlx::query(
            r"
            UPDATE app.job
            SET status = $1, last_error = $2, run_at = COALESCE($3, run_at), locked_at = NULL
            WHERE id = $4
            ",
        )
        .bind(status)
        .bind(error)
        .bind(retry_at)
        .bind(id.as_i32())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Return `running` jobs locked before `cutoff` to the queue.
    ///
    /// Their attempt stays counted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn requeue_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE app.job
            SET status = 'queued', locked_at = NULL, run_at = NOW()
            WHERE status = 'running' AND locked_at < $1
            ",
        )
        .bind(cutoff)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: JobId) -> Result<Option<Job>, RepositoryError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM app.job WHERE id = $1"
        ))
        .bind(id.as_i32())
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    /// Most recent jobs of a shop.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_shop(
        &self,
        shop_id: ShopId,
        limit: i64,
    ) -> Result<Vec<Job>, RepositoryError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM app.job WHERE shop_id = $1 ORDER BY created_at DESC LIMIT $2"
        ))
        .bind(shop_id.as_i32())
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Job counts by kind and status, optionally for one shop.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn counts(&self, shop_id: Option<ShopId>) -> Result<Vec<JobCount>, RepositoryError> {
        let rows = sqlx::query_as::<_, JobCountRow>(
            r"
            SELECT kind, status, COUNT(*) AS count
            FROM app.job
            WHERE $1::INTEGER IS NULL OR shop_id = $1
            GROUP BY kind, status
            ORDER BY kind, status
            ",
        )
        .bind(shop_id.map(|s| s.as_i32()))
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| JobCount {
                kind: r.kind,
                status: r.status,
                count: r.count,
            })
            .collect())
    }

    /// Put a dead or failed job back in the queue with a fresh attempt budget.
    ///
    /// When `shop_id` is given the job must belong to that shop.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no retryable job matched.
    pub async fn retry(&self, id: JobId, shop_id: Option<ShopId>) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE app.job
            SET status = 'queued', attempts = 0, run_at = NOW(), locked_at = NULL
            WHERE id = $1 AND status IN ('dead', 'failed')
              AND ($2::INTEGER IS NULL OR shop_id = $2)
            ",
        )
        .bind(id.as_i32())
        .bind(shop_id.map(|s| s.as_i32()))
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Requeue every dead job.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn retry_all_dead(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE app.job
            SET status = 'queued', attempts = 0, run_at = NOW(), locked_at = NULL
            WHERE status = 'dead'
            ",
        )
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete completed jobs finished before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn purge_completed(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM app.job WHERE status = 'completed' AND completed_at < $1")
                .bind(cutoff)
                .execute(self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}
