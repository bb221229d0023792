//! HTTP middleware for the admin.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request tracing)
//! 3. Security headers (`frame-ancestors` for the embedding shop)
//! 4. Session layer (OAuth state during install only)
//!
//! Embedded pages authenticate per request through the [`ShopSession`]
//! extractor rather than a guard layer.

pub mod auth;
pub mod security_headers;
pub mod session;

pub use auth::{ShopSession, ShopSessionRejection, with_shop};
pub use security_headers::security_headers_middleware;
pub use session::{OAUTH_STATE_KEY, create_session_layer};
