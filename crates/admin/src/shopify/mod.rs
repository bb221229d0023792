//! Shopify app credentials and the per-shop Admin API client.
//!
//! # Architecture
//!
//! - [`ShopifyApp`] holds the app's client ID and secret. It runs the OAuth
//!   install flow, verifies session tokens, query HMACs and webhook HMACs,
//!   and exchanges session tokens for offline access tokens.
//! - [`AdminClient`] talks to one shop's Admin GraphQL API with that shop's
//!   offline token. Queries implement `graphql_client::GraphQLQuery` and are
//!   sent over `reqwest`.
//!
//! # Example
//!
//! ```rust,ignore
//! let client = state.shopify().client(&shop.domain, token);
//! let discounts = client.get_discounts(25, None, None).await?;
//! ```

mod admin;
mod auth;
pub mod types;

pub use admin::AdminClient;
pub use auth::{AccessToken, SessionClaims, ShopifyApp};
pub use types::*;

use storekeep_core::MoneyError;
use thiserror::Error;

/// Errors that can occur when interacting with the Shopify Admin API.
#[derive(Debug, Error)]
pub enum AdminShopifyError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// GraphQL query returned errors.
    #[error("GraphQL errors: {}", format_graphql_errors(.0))]
    GraphQL(Vec<GraphQLError>),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A money value in the response could not be represented.
    #[error("Unexpected money value: {0}")]
    Money(#[from] MoneyError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by Shopify.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Authentication/authorization failed.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A mutation rejected its input.
    #[error("{}", format_user_errors(.0))]
    UserErrors(Vec<UserError>),

    /// OAuth code or token exchange failed.
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// Session token failed verification.
    #[error("Invalid session token: {0}")]
    InvalidSessionToken(String),
}

impl AdminShopifyError {
    /// Messages to show as banners when the error is caused by merchant input.
    #[must_use]
    pub fn user_messages(&self) -> Vec<String> {
        match self {
            Self::UserErrors(errors) => errors.iter().map(ToString::to_string).collect(),
            _ => Vec::new(),
        }
    }
}

/// A GraphQL error returned by the Shopify Admin API.
#[derive(Debug, Clone)]
pub struct GraphQLError {
    /// Error message.
    pub message: String,
    /// Source locations in the query.
    pub locations: Vec<GraphQLErrorLocation>,
    /// Path to the error in the response.
    pub path: Vec<serde_json::Value>,
}

/// Location in a GraphQL query where an error occurred.
#[derive(Debug, Clone)]
pub struct GraphQLErrorLocation {
    /// Line number (1-indexed).
    pub line: i64,
    /// Column number (1-indexed).
    pub column: i64,
}

fn format_graphql_errors(errors: &[GraphQLError]) -> String {
    errors
        .iter()
        .map(|e| e.message.clone())
        .collect::<Vec<_>>()
        .join("; ")
}

fn format_user_errors(errors: &[UserError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_shopify_error_display() {
        let err = AdminShopifyError::NotFound("discount-123".to_string());
        assert_eq!(err.to_string(), "Not found: discount-123");
    }

    #[test]
    fn test_graphql_error_formatting() {
        let errors = vec![
            GraphQLError {
                message: "Field not found".to_string(),
                locations: vec![],
                path: vec![],
            },
            GraphQLError {
                message: "Invalid ID".to_string(),
                locations: vec![],
                path: vec![],
            },
        ];
        let err = AdminShopifyError::GraphQL(errors);
        assert_eq!(err.to_string(), "GraphQL errors: Field not found; Invalid ID");
    }

    #[test]
    fn test_rate_limited_error() {
        let err = AdminShopifyError::RateLimited(60);
        assert_eq!(err.to_string(), "Rate limited, retry after 60 seconds");
    }

    #[test]
    fn test_user_errors_display_and_banners() {
        let err = AdminShopifyError::UserErrors(vec![
            UserError {
                field: Some(vec!["metafields".into(), "0".into(), "value".into()]),
                message: "is invalid".to_string(),
                code: Some("INVALID_VALUE".to_string()),
            },
            UserError {
                field: None,
                message: "Code must be unique".to_string(),
                code: None,
            },
        ]);
        assert_eq!(
            err.to_string(),
            "metafields.0.value: is invalid; Code must be unique"
        );
        assert_eq!(err.user_messages().len(), 2);
        assert!(AdminShopifyError::RateLimited(1).user_messages().is_empty());
    }
}
