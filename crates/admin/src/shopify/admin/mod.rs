//! Admin API GraphQL client for a single installed shop.
//!
//! One client is built per request from the shop's offline access token.
//! Operations are grouped by domain in the submodules, each adding methods to
//! [`AdminClient`].

use std::sync::Arc;

use graphql_client::GraphQLQuery;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, de::DeserializeOwned};
use storekeep_core::ShopDomain;

use super::{AdminShopifyError, GraphQLError, GraphQLErrorLocation, types::UserError};

mod billing;
mod discounts;
mod files;
mod metafields;
pub mod queries;
mod shop;

/// Shopify Admin API GraphQL client for one shop.
#[derive(Clone)]
pub struct AdminClient {
    inner: Arc<AdminClientInner>,
}

struct AdminClientInner {
    http: reqwest::Client,
    shop: ShopDomain,
    token: SecretString,
    endpoint: String,
}

impl std::fmt::Debug for AdminClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminClient")
            .field("shop", &self.inner.shop)
            .field("endpoint", &self.inner.endpoint)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// GraphQL response wrapper.
#[derive(Debug, Deserialize)]
struct GraphQLResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQLErrorResponse>>,
}

#[derive(Debug, Deserialize)]
struct GraphQLErrorResponse {
    message: String,
    #[serde(default)]
    locations: Vec<GraphQLErrorLocationResponse>,
    #[serde(default)]
    path: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GraphQLErrorLocationResponse {
    line: i64,
    column: i64,
}

impl AdminClient {
    /// Create a client for `shop` using its offline access token.
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        shop: ShopDomain,
        token: SecretString,
        api_version: &str,
    ) -> Self {
        let endpoint = format!("https://{shop}/admin/api/{api_version}/graphql.json");
        Self::with_endpoint(http, shop, token, endpoint)
    }

    /// Create a client that posts to an explicit GraphQL endpoint.
    ///
    /// Used by tests to point the client at a mock server.
    #[must_use]
    pub fn with_endpoint(
        http: reqwest::Client,
        shop: ShopDomain,
        token: SecretString,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(AdminClientInner {
                http,
                shop,
                token,
                endpoint: endpoint.into(),
            }),
        }
    }

    /// The shop this client talks to.
    #[must_use]
    pub fn shop(&self) -> &ShopDomain {
        &self.inner.shop
    }

    fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    // =========================================================================
    // GraphQL Execution
    // =========================================================================

    /// Execute a GraphQL operation.
    async fn execute<Q: GraphQLQuery>(
        &self,
        variables: Q::Variables,
    ) -> Result<Q::ResponseData, AdminShopifyError>
    where
        Q::ResponseData: DeserializeOwned,
    {
        let body = Q::build_query(variables);

        let response = self
            .inner
            .http
            .post(&self.inner.endpoint)
            .header("X-Shopify-Access-Token", self.inner.token.expose_secret())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .map_or(60, parse_retry_after);
            return Err(AdminShopifyError::RateLimited(retry_after));
        }

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AdminShopifyError::Unauthorized(
                "Invalid or expired access token".to_string(),
            ));
        }

        let response = response.error_for_status()?;
        let bytes = response.bytes().await?;
        let graphql_response: GraphQLResponse<Q::ResponseData> = serde_json::from_slice(&bytes)?;

        if let Some(errors) = graphql_response.errors
            && !errors.is_empty()
        {
            let converted_errors: Vec<GraphQLError> = errors
                .into_iter()
                .map(|e| GraphQLError {
                    message: e.message,
                    locations: e
                        .locations
                        .into_iter()
                        .map(|l| GraphQLErrorLocation {
                            line: l.line,
                            column: l.column,
                        })
                        .collect(),
                    path: e.path,
                })
                .collect();
            if converted_errors.iter().any(|e| e.message == "Throttled") {
                return Err(AdminShopifyError::RateLimited(1));
            }
            return Err(AdminShopifyError::GraphQL(converted_errors));
        }

        graphql_response
            .data
            .ok_or_else(|| missing("No data in response"))
    }
}

/// Fail with `UserErrors` when a mutation payload rejected its input.
fn check_user_errors(errors: Vec<UserError>) -> Result<(), AdminShopifyError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AdminShopifyError::UserErrors(errors))
    }
}

/// Whole seconds from a `Retry-After` value; Shopify sends fractional ones.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_retry_after(value: &str) -> u64 {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map_or(60, |secs| secs.ceil().max(1.0) as u64)
}

/// A GraphQL error for a response that is well-formed but lacks a field.
fn missing(message: &str) -> AdminShopifyError {
    AdminShopifyError::GraphQL(vec![GraphQLError {
        message: message.to_string(),
        locations: vec![],
        path: vec![],
    }])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("2.0"), 2);
        assert_eq!(parse_retry_after("0.2"), 1);
        assert_eq!(parse_retry_after(" 30 "), 30);
        assert_eq!(parse_retry_after("soon"), 60);
    }

    #[test]
    fn test_check_user_errors() {
        assert!(check_user_errors(vec![]).is_ok());
        let err = check_user_errors(vec![UserError {
            field: Some(vec!["code".into()]),
            message: "has already been taken".into(),
            code: None,
        }])
        .unwrap_err();
        assert_eq!(err.to_string(), "code: has already been taken");
    }

    #[test]
    fn test_debug_redacts_token() {
        let client = AdminClient::new(
            reqwest::Client::new(),
            ShopDomain::parse("cool-shop.myshopify.com").unwrap(),
            SecretString::from("shpat_secret"),
            "2025-10",
        );
        let debug = format!("{client:?}");
        assert!(debug.contains("cool-shop.myshopify.com/admin/api/2025-10/graphql.json"));
        assert!(!debug.contains("shpat_secret"));
    }
}
