//! Unified error handling for the admin app.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::claude::ClaudeError;
use crate::db::RepositoryError;
use crate::queue::QueueError;
use crate::services::{BillingError, ChatError, InstallError, StorageError};
use crate::shopify::AdminShopifyError;

/// Application-level error type for request handlers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    #[error("Shopify error: {0}")]
    Shopify(#[from] AdminShopifyError),

    #[error("Claude error: {0}")]
    Claude(#[from] ClaudeError),

    #[error("Billing error: {0}")]
    Billing(#[from] BillingError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    #[error("Install error: {0}")]
    Install(#[from] InstallError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Database(RepositoryError::NotFound) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(RepositoryError::Conflict(_)) => StatusCode::CONFLICT,
            Self::Database(_) | Self::Queue(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Shopify(AdminShopifyError::UserErrors(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Shopify(AdminShopifyError::RateLimited(_))
            | Self::Claude(ClaudeError::RateLimited(_)) => StatusCode::TOO_MANY_REQUESTS,
            Self::Claude(ClaudeError::Overloaded) | Self::Unavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Shopify(_) | Self::Claude(_) => StatusCode::BAD_GATEWAY,
            Self::Billing(e) if e.is_client_error() => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Billing(BillingError::Shopify(_)) => StatusCode::BAD_GATEWAY,
            Self::Billing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(StorageError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Storage(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Chat(ChatError::SessionNotFound) => StatusCode::NOT_FOUND,
            Self::Chat(ChatError::EmptyMessage) => StatusCode::BAD_REQUEST,
            Self::Chat(ChatError::Claude(_)) => StatusCode::BAD_GATEWAY,
            Self::Chat(ChatError::Database(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Install(InstallError::Shopify(_)) => StatusCode::BAD_GATEWAY,
            Self::Install(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Text safe to show the merchant.
    #[must_use]
    pub fn public_message(&self) -> String {
        let status = self.status();
        match self {
            Self::Billing(e) => e
                .user_message()
                .unwrap_or_else(|| "Billing is unavailable right now.".to_string()),
            Self::Shopify(AdminShopifyError::UserErrors(_)) => self
                .shopify_messages()
                .join(" "),
            Self::Storage(e) if e.is_client_error() => e.to_string(),
            Self::Chat(ChatError::EmptyMessage | ChatError::SessionNotFound) => {
                self.to_string()
            }
            Self::NotFound(_)
            | Self::Unauthorized(_)
            | Self::Forbidden(_)
            | Self::BadRequest(_)
            | Self::Unavailable(_) => self.to_string(),
            _ if status == StatusCode::TOO_MANY_REQUESTS => {
                "Shopify is rate limiting requests. Try again shortly.".to_string()
            }
            _ if status.is_server_error() && status != StatusCode::BAD_GATEWAY => {
                "Internal server error".to_string()
            }
            _ => "External service error".to_string(),
        }
    }

    fn shopify_messages(&self) -> Vec<String> {
        match self {
            Self::Shopify(e) => e.user_messages(),
            _ => Vec::new(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Admin request error"
            );
        } else {
            tracing::debug!(error = %self, %status, "Request rejected");
        }

        (status, self.public_message()).into_response()
    }
}

/// Tag Sentry events with the shop (and staff user) behind a request.
pub fn set_sentry_shop(shop_domain: &str, user_id: Option<i64>) {
    sentry::configure_scope(|scope| {
        scope.set_tag("shop", shop_domain);
        scope.set_user(user_id.map(|id| sentry::User {
            id: Some(id.to_string()),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use storekeep_core::Money;

    use super::*;

    fn status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("discount 123".to_string());
        assert_eq!(err.to_string(), "Not found: discount 123");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(status(AppError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(AppError::Unauthorized("x".into())), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AppError::BadRequest("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(AppError::Unavailable("x".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(AppError::Internal("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(AppError::Database(RepositoryError::NotFound)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(AppError::Shopify(AdminShopifyError::RateLimited(2))),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_storage_errors() {
        let err = AppError::Storage(StorageError::TooLarge { max_bytes: 10 });
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(err.public_message().contains("10 byte"));
    }

    #[test]
    fn test_billing_client_error_is_shown() {
        let remaining = Money::parse("1.50", "USD").unwrap();
        let err = AppError::Billing(BillingError::UsageCapExceeded { remaining });
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.public_message().contains("1.50"));
    }

    #[test]
    fn test_internal_details_hidden() {
        let err = AppError::Internal("secret path /var/lib".to_string());
        assert_eq!(err.public_message(), "Internal server error");
    }
}
