//! Job queue maintenance commands.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use storekeep_admin::db::JobRepository;

use super::CliError;

/// Print job counts by kind and status.
///
/// # Errors
///
/// Returns an error if the query fails.
pub async fn stats(pool: &PgPool) -> Result<(), CliError> {
    let counts = JobRepository::new(pool).counts(None).await?;
    if counts.is_empty() {
        tracing::info!("Queue is empty");
        return Ok(());
    }

    for c in &counts {
        tracing::info!("{:<20} {:<10} {}", c.kind.as_str(), c.status.as_str(), c.count);
    }
    let total: i64 = counts.iter().map(|c| c.count).sum();
    tracing::info!("{total} jobs");
    Ok(())
}

/// Requeue every dead job.
///
/// # Errors
///
/// Returns an error if the query fails.
pub async fn retry_dead(pool: &PgPool) -> Result<(), CliError> {
    let requeued = JobRepository::new(pool).retry_all_dead().await?;
    tracing::info!("Requeued {requeued} dead jobs");
    Ok(())
}

/// Delete completed jobs older than `days`.
///
/// # Errors
///
/// Returns an error for a negative age or if the query fails.
pub async fn purge(pool: &PgPool, days: i64) -> Result<(), CliError> {
    let age = purge_age(days)?;
    let deleted = JobRepository::new(pool)
        .purge_completed(Utc::now() - age)
        .await?;
    tracing::info!("Deleted {deleted} completed jobs older than {days} days");
    Ok(())
}

fn purge_age(days: i64) -> Result<Duration, CliError> {
    if days < 0 {
        return Err(CliError::Invalid("--older-than-days cannot be negative".into()));
    }
    Duration::try_days(days).ok_or_else(|| CliError::Invalid(format!("{days} days is too large")))
}
