//! Database migration command.
//!
//! Migrations live in `crates/admin/migrations/` and are embedded in the
//! admin crate; the server never runs them on startup.

use sqlx::PgPool;
use storekeep_admin::db::MIGRATOR;

use super::CliError;

/// Apply pending migrations.
///
/// # Errors
///
/// Returns an error if a migration fails.
pub async fn run(pool: &PgPool) -> Result<(), CliError> {
    tracing::info!("Running migrations...");
    MIGRATOR.run(pool).await?;
    tracing::info!("Migrations complete!");
    Ok(())
}
