//! Database operations for the admin app.
//!
//! # Schema: `app`
//!
//! ## Tables
//!
//! - `shop` / `shop_user` - Installed shops (offline tokens) and their staff
//! - `plan`, `subscription`, `usage_charge`, `one_time_purchase` - Billing
//! - `coupon`, `coupon_redemption` - App-level promo codes
//! - `category`, `section` - Metafield editor layout
//! - `job` - Background queue
//! - `stored_file` - Uploaded file metadata
//! - `chat_session`, `chat_message` - Assistant history
//! - `session` - `tower-sessions` store
//!
//! # Migrations
//!
//! Migrations are stored in `crates/admin/migrations/` and run via:
//! ```bash
//! cargo run -p storekeep-cli -- migrate
//! ```

pub mod chat;
pub mod coupons;
pub mod files;
pub mod jobs;
pub mod layout;
pub mod plans;
pub mod purchases;
pub mod shops;
pub mod subscriptions;
pub mod users;

use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use storekeep_core::Money;
use thiserror::Error;

pub use chat::ChatRepository;
pub use coupons::CouponRepository;
pub use files::FileRepository;
pub use jobs::JobRepository;
pub use layout::{CategoryInput, LayoutRepository, SectionInput};
pub use plans::{PlanInput, PlanRepository};
pub use purchases::PurchaseRepository;
pub use shops::ShopRepository;
pub use subscriptions::{NewSubscription, SubscriptionRepository};
pub use users::UserRepository;

/// Embedded migrations for the `app` schema.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate coupon code).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Build `Money` from a `NUMERIC` column and its currency column.
pub(crate) fn money(amount: Decimal, currency_code: &str) -> Result<Money, RepositoryError> {
    let currency = currency_code
        .parse()
        .map_err(|e| RepositoryError::DataCorruption(format!("invalid currency in database: {e}")))?;
    Ok(Money::new(amount, currency))
}

/// Map a unique violation to `Conflict`, keeping every other error as-is.
pub(crate) fn conflict_on_unique(e: sqlx::Error, message: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(message.to_owned());
    }
    RepositoryError::Database(e)
}
