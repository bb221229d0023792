//! Embedded app authentication.
//!
//! Every embedded page and fetch carries an App Bridge session token, either
//! as `Authorization: Bearer <token>` or as the `id_token` query parameter
//! Shopify appends on document loads.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, StatusCode, header, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use storekeep_core::ShopDomain;
use tracing::{debug, warn};

use crate::db::UserRepository;
use crate::error::{AppError, set_sentry_shop};
use crate::models::Shop;
use crate::services::complete_install;
use crate::shopify::{AdminClient, AdminShopifyError};
use crate::state::AppState;

/// Header telling App Bridge to fetch a fresh token and retry.
pub const RETRY_INVALID_SESSION_HEADER: &str = "X-Shopify-Retry-Invalid-Session-Request";

/// An authenticated request from an installed shop.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(session: ShopSession) -> impl IntoResponse {
///     format!("Hello, {}!", session.shop.display_name())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ShopSession {
    pub shop: Shop,
    pub client: AdminClient,
    /// Staff member behind the token.
    pub user_id: Option<i64>,
}

impl ShopSession {
    /// Redirect to an embedded page; the bounce page re-attaches a token.
    #[must_use]
    pub fn redirect(&self, path: &str) -> Redirect {
        Redirect::to(&with_shop(path, &self.shop.domain))
    }
}

/// Append `shop=<domain>` to a local path.
#[must_use]
pub fn with_shop(path: &str, shop: &ShopDomain) -> String {
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{path}{separator}shop={}", urlencoding::encode(shop.as_str()))
}

/// Why a request was not authenticated.
#[derive(Debug)]
pub enum ShopSessionRejection {
    /// Fetch/XHR without a valid token: App Bridge retries with a new one.
    Unauthorized,
    /// Document load without a token: bounce through App Bridge.
    Bounce { shop: ShopDomain, reload: String },
    /// The shop never installed the app: break out of the frame into OAuth.
    Install(ShopDomain),
    /// No way to tell which shop this is.
    MissingShop,
    Error(AppError),
}

impl IntoResponse for ShopSessionRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                [(RETRY_INVALID_SESSION_HEADER, "1")],
                "Session token missing or invalid",
            )
                .into_response(),
            Self::Bounce { shop, reload } => Redirect::to(&format!(
                "/auth/session-token?shop={}&shopify-reload={}",
                urlencoding::encode(shop.as_str()),
                urlencoding::encode(&reload)
            ))
            .into_response(),
            Self::Install(shop) => Redirect::to(&format!(
                "/auth?shop={}&embedded=1",
                urlencoding::encode(shop.as_str())
            ))
            .into_response(),
            Self::MissingShop => (
                StatusCode::BAD_REQUEST,
                "Open this app from your Shopify admin.",
            )
                .into_response(),
            Self::Error(e) => e.into_response(),
        }
    }
}

impl<E: Into<AppError>> From<E> for ShopSessionRejection {
    fn from(e: E) -> Self {
        Self::Error(e.into())
    }
}

/// Whether the request came from script rather than a document load.
fn is_script_request(headers: &HeaderMap) -> bool {
    let accepts = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    headers.contains_key(header::AUTHORIZATION)
        || headers.contains_key("HX-Request")
        || accepts.contains("application/json")
        || accepts.contains("text/event-stream")
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn query_pairs(parts: &Parts) -> Vec<(String, String)> {
    parts
        .uri
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

/// The request path and query without `id_token`, for the bounce page.
fn reload_target(parts: &Parts, query: &[(String, String)]) -> String {
    let kept: Vec<(&str, &str)> = query
        .iter()
        .filter(|(k, _)| k != "id_token")
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    if kept.is_empty() {
        return parts.uri.path().to_string();
    }
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(kept)
        .finish();
    format!("{}?{query}", parts.uri.path())
}

/// A refused token exchange sends the merchant back through install; the
/// script variant lets App Bridge retry with a fresh token first.
fn exchange_rejection(
    error: AdminShopifyError,
    script: bool,
    shop: ShopDomain,
) -> ShopSessionRejection {
    match error {
        AdminShopifyError::OAuth(reason) => {
            warn!(shop = %shop, reason = %reason, "Session token exchange refused");
            if script {
                ShopSessionRejection::Unauthorized
            } else {
                ShopSessionRejection::Install(shop)
            }
        }
        other => other.into(),
    }
}

impl FromRequestParts<AppState> for ShopSession {
    type Rejection = ShopSessionRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let query = query_pairs(parts);
        let query_shop = query
            .iter()
            .find(|(k, _)| k == "shop")
            .and_then(|(_, v)| ShopDomain::parse(v).ok());
        let script = is_script_request(&parts.headers);

        let token = bearer_token(&parts.headers).or_else(|| {
            query
                .iter()
                .find(|(k, _)| k == "id_token")
                .map(|(_, v)| v.clone())
        });

        let fail = |reason: &str| {
            debug!(reason, path = %parts.uri.path(), "Embedded request not authenticated");
            if script {
                return ShopSessionRejection::Unauthorized;
            }
            query_shop.clone().map_or(ShopSessionRejection::MissingShop, |shop| {
                ShopSessionRejection::Bounce {
                    shop,
                    reload: reload_target(parts, &query),
                }
            })
        };

        let Some(token) = token else {
            if !script {
                if let Some(shop) = &query_shop {
                    let installed = state
                        .cached_shop(shop)
                        .await?
                        .is_some_and(|s| s.is_installed());
                    if !installed {
                        return Err(ShopSessionRejection::Install(shop.clone()));
                    }
                }
            }
            return Err(fail("no session token"));
        };

        let claims = match state.shopify().verify_session_token(&token) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(error = %e, "Session token rejected");
                return Err(fail("invalid session token"));
            }
        };
        let domain = claims.shop().map_err(|_| fail("bad dest claim"))?;

        let shop = match state.cached_shop(&domain).await? {
            Some(shop) if shop.is_installed() => shop,
            _ => {
                let access = match state
                    .shopify()
                    .exchange_session_token(&domain, &token)
                    .await
                {
                    Ok(access) => access,
                    Err(e) => return Err(exchange_rejection(e, script, domain)),
                };
                complete_install(state, &domain, access).await?
            }
        };

        let user_id = claims.user_id();
        if let Some(uid) = user_id {
            if let Err(e) = UserRepository::new(state.pool()).touch(shop.id, uid).await {
                warn!(error = %e, "Failed to record staff user");
            }
        }

        let client = state
            .admin_client(&shop)
            .ok_or_else(|| AppError::Internal(format!("shop {} has no token", shop.domain)))?;

        set_sentry_shop(shop.domain.as_str(), user_id);

        Ok(Self {
            shop,
            client,
            user_id,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(uri: &str, headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri(uri);
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token() {
        let p = parts("/", &[("Authorization", "Bearer abc.def.ghi")]);
        assert_eq!(bearer_token(&p.headers).as_deref(), Some("abc.def.ghi"));

        let p = parts("/", &[("Authorization", "Basic Zm9v")]);
        assert!(bearer_token(&p.headers).is_none());
    }

    #[test]
    fn test_script_detection() {
        assert!(is_script_request(&parts("/", &[("HX-Request", "true")]).headers));
        assert!(is_script_request(
            &parts("/", &[("Accept", "text/event-stream")]).headers
        ));
        assert!(!is_script_request(
            &parts("/", &[("Accept", "text/html,application/xhtml+xml")]).headers
        ));
    }

    #[test]
    fn test_reload_target_drops_token() {
        let p = parts("/billing?shop=cool-shop.myshopify.com&id_token=xyz&host=abc", &[]);
        let query = query_pairs(&p);
        assert_eq!(
            reload_target(&p, &query),
            "/billing?shop=cool-shop.myshopify.com&host=abc"
        );

        let p = parts("/jobs?id_token=xyz", &[]);
        assert_eq!(reload_target(&p, &query_pairs(&p)), "/jobs");
    }

    #[test]
    fn test_with_shop() {
        let shop = ShopDomain::parse("cool-shop.myshopify.com").unwrap();
        assert_eq!(with_shop("/billing", &shop), "/billing?shop=cool-shop.myshopify.com");
        assert_eq!(
            with_shop("/billing/usage?page=2", &shop),
            "/billing/usage?page=2&shop=cool-shop.myshopify.com"
        );
    }

    #[test]
    fn test_unauthorized_asks_for_retry() {
        let response = ShopSessionRejection::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(RETRY_INVALID_SESSION_HEADER).unwrap(),
            "1"
        );
    }

    #[test]
    fn test_install_redirect() {
        let shop = ShopDomain::parse("cool-shop.myshopify.com").unwrap();
        let response = ShopSessionRejection::Install(shop).into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/auth?shop=cool-shop.myshopify.com&embedded=1"
        );
    }

    #[test]
    fn test_refused_exchange_reinstalls() {
        let shop = ShopDomain::parse("cool-shop.myshopify.com").unwrap();
        let refused =
            || AdminShopifyError::OAuth("Session token exchange failed (400 Bad Request)".into());

        let response = exchange_rejection(refused(), false, shop.clone()).into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/auth?shop=cool-shop.myshopify.com&embedded=1"
        );

        let response = exchange_rejection(refused(), true, shop).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(RETRY_INVALID_SESSION_HEADER).unwrap(),
            "1"
        );
    }
}
