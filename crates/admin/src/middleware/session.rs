//! Session middleware configuration.
//!
//! Cookie sessions only carry the OAuth `state` nonce between `/auth` and
//! `/auth/callback`; embedded pages authenticate with session tokens.

use sqlx::PgPool;
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::AppConfig;

pub const SESSION_COOKIE_NAME: &str = "storekeep_session";

/// Key of the OAuth nonce in the session.
pub const OAUTH_STATE_KEY: &str = "oauth_state";

/// Long enough to finish the install screen.
const SESSION_EXPIRY_SECONDS: i64 = 15 * 60;

/// Create the session layer backed by `app.session`.
///
/// # Panics
///
/// Panics if the schema or table name is rejected (both are constants).
#[must_use]
pub fn create_session_layer(pool: &PgPool, config: &AppConfig) -> SessionManagerLayer<PostgresStore> {
    let store = PostgresStore::new(pool.clone())
        .with_schema_name("app")
        .expect("valid schema name")
        .with_table_name("session")
        .expect("valid table name");

    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(config.is_https())
        // Lax: the OAuth callback is a cross-site top-level redirect from Shopify
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/auth")
}
