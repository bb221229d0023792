//! Install and embedded-auth routes.
//!
//! OAuth runs at the top level (cookies don't survive the admin iframe), so
//! `/auth` first breaks out of the frame when it's loaded embedded. Once
//! installed, pages authenticate with session tokens and only come back here
//! through the bounce page when a document load arrives without one.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Router,
    extract::{Query, RawQuery, State},
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use serde::Deserialize;
use storekeep_core::ShopDomain;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::AppError;
use crate::middleware::OAUTH_STATE_KEY;
use crate::services::complete_install;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth", get(begin))
        .route("/auth/callback", get(callback))
        .route("/auth/session-token", get(session_token_bounce))
}

// =============================================================================
// Templates
// =============================================================================

/// Opens `/auth` in the top window.
#[derive(Template, WebTemplate)]
#[template(path = "auth/exit_iframe.html")]
pub struct ExitIframeTemplate {
    pub api_key: String,
    pub target: String,
}

/// Lets App Bridge reload the page with a fresh `id_token`.
#[derive(Template, WebTemplate)]
#[template(path = "auth/bounce.html")]
pub struct BounceTemplate {
    pub api_key: String,
}

// =============================================================================
// Query Parameters
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct BeginQuery {
    pub shop: Option<String>,
    pub embedded: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BounceQuery {
    #[serde(rename = "shopify-reload")]
    pub reload: Option<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /auth - Start the OAuth install for a shop.
#[instrument(skip(state, session))]
async fn begin(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<BeginQuery>,
) -> Result<Response, AppError> {
    let shop = query
        .shop
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("Missing shop parameter".to_string()))
        .and_then(|s| {
            ShopDomain::parse(s).map_err(|e| AppError::BadRequest(format!("Invalid shop: {e}")))
        })?;

    if query.embedded.as_deref() == Some("1") {
        return Ok(ExitIframeTemplate {
            api_key: state.shopify().api_key().to_string(),
            target: state
                .config()
                .url_for(&format!("/auth?shop={}", urlencoding::encode(shop.as_str()))),
        }
        .into_response());
    }

    let oauth_state = uuid::Uuid::new_v4().to_string();
    session
        .insert(OAUTH_STATE_KEY, &oauth_state)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to store OAuth state: {e}")))?;

    let redirect_uri = state.config().url_for("/auth/callback");
    let auth_url = state
        .shopify()
        .authorization_url(&shop, &redirect_uri, &oauth_state);

    tracing::info!(shop = %shop, "Redirecting to Shopify OAuth");
    Ok(Redirect::to(&auth_url).into_response())
}

/// GET /auth/callback - Finish the OAuth install.
#[instrument(skip(state, session, raw))]
async fn callback(
    State(state): State<AppState>,
    session: Session,
    RawQuery(raw): RawQuery,
) -> Result<Redirect, AppError> {
    let params: Vec<(String, String)> = raw
        .as_deref()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();
    let param = |name: &str| {
        params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    };

    if !state.shopify().verify_query_hmac(&params) {
        tracing::warn!("Invalid HMAC signature in OAuth callback");
        return Err(AppError::Unauthorized("Invalid signature".to_string()));
    }

    let stored_state: Option<String> = session.get(OAUTH_STATE_KEY).await.ok().flatten();
    if stored_state.is_none() || stored_state.as_deref() != param("state") {
        tracing::warn!("OAuth state mismatch");
        return Err(AppError::Forbidden("OAuth state mismatch".to_string()));
    }
    if let Err(e) = session.remove::<String>(OAUTH_STATE_KEY).await {
        tracing::warn!(error = %e, "Failed to clear OAuth state");
    }

    let shop = param("shop")
        .ok_or_else(|| AppError::BadRequest("Missing shop parameter".to_string()))
        .and_then(|s| {
            ShopDomain::parse(s).map_err(|e| AppError::BadRequest(format!("Invalid shop: {e}")))
        })?;
    let code = param("code")
        .ok_or_else(|| AppError::BadRequest("Missing authorization code".to_string()))?;

    let token = state.shopify().exchange_code(&shop, code).await?;
    complete_install(&state, &shop, token).await?;

    tracing::info!(shop = %shop, "OAuth install complete");
    Ok(Redirect::to(&shop.admin_app_url(state.shopify().api_key())))
}

/// GET /auth/session-token - Bounce page for document loads without a token.
async fn session_token_bounce(
    State(state): State<AppState>,
    Query(query): Query<BounceQuery>,
) -> Result<BounceTemplate, AppError> {
    let reload = query.reload.unwrap_or_default();
    if !is_local_path(&reload) {
        return Err(AppError::BadRequest("Invalid reload target".to_string()));
    }

    Ok(BounceTemplate {
        api_key: state.shopify().api_key().to_string(),
    })
}

/// A same-origin absolute path (no scheme, no `//host`).
fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_local_path() {
        assert!(is_local_path("/billing?shop=a.myshopify.com"));
        assert!(!is_local_path("//evil.example.com/"));
        assert!(!is_local_path("https://evil.example.com/"));
        assert!(!is_local_path("/\\evil.example.com"));
        assert!(!is_local_path(""));
    }
}
