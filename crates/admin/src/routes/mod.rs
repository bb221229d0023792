//! HTTP route handlers for the embedded admin.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health, /health/ready           - Liveness and readiness
//!
//! # Install (OAuth) and embedded auth
//! GET  /auth?shop=                      - Begin OAuth install
//! GET  /auth/callback                   - Finish OAuth install
//! GET  /auth/session-token              - App Bridge bounce page
//!
//! # Embedded pages (ShopSession)
//! GET  /                                - Dashboard
//! GET  /billing                         - Plans, subscription and usage
//! POST /billing/subscribe|cancel|coupon
//! GET  /billing/confirm
//! GET|POST /billing/usage
//! GET|POST /billing/purchases, GET /billing/purchases/confirm
//! GET  /discounts, /discounts/new, /discounts/{id}/edit
//! POST /discounts, /discounts/{id}, /discounts/{id}/activate|deactivate|delete
//! GET  /metafields, /metafields/{product_id}
//! POST /metafields/{product_id}, /metafields/{product_id}/delete
//! GET  /jobs, POST /jobs/{id}/retry, POST /jobs/reports
//! GET  /files, POST /files, GET /files/{id}
//! GET  /chat, /chat/{session_id}, POST /chat/stream
//!
//! # Shopify callbacks
//! POST /webhooks
//! ```

pub mod auth;
pub mod billing;
pub mod chat;
pub mod dashboard;
pub mod discounts;
pub mod files;
pub mod health;
pub mod jobs;
pub mod metafields;
pub mod webhooks;

use askama::Template;
use axum::{
    Router,
    response::{Html, IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::middleware::ShopSession;
use crate::state::AppState;

/// Build the application router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(dashboard::router())
        .merge(billing::router())
        .merge(discounts::router())
        .merge(metafields::router())
        .merge(jobs::router())
        .merge(files::router())
        .merge(chat::router())
        .merge(webhooks::router())
}

/// Values every embedded page needs: App Bridge key, shop and nav state.
#[derive(Debug, Clone)]
pub struct PageContext {
    pub api_key: String,
    pub shop_domain: String,
    pub shop_name: String,
    pub current_path: &'static str,
    pub success: Option<String>,
    pub error: Option<String>,
}

impl PageContext {
    pub fn new(state: &AppState, session: &ShopSession, current_path: &'static str) -> Self {
        Self {
            api_key: state.shopify().api_key().to_string(),
            shop_domain: session.shop.domain.as_str().to_string(),
            shop_name: session.shop.display_name().to_string(),
            current_path,
            success: None,
            error: None,
        }
    }

    /// Fill the banners from `?success=` / `?error=` redirect codes.
    #[must_use]
    pub fn with_notice(mut self, notice: &NoticeQuery) -> Self {
        self.success = notice.success.as_deref().map(notice_text);
        self.error = notice.error.as_deref().map(notice_text);
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Whether a nav entry is the current section.
    #[must_use]
    pub fn is_active(&self, path: &str) -> bool {
        if path == "/" {
            self.current_path == "/"
        } else {
            self.current_path.starts_with(path)
        }
    }
}

/// Banner codes passed through redirects.
#[derive(Debug, Default, Deserialize)]
pub struct NoticeQuery {
    pub success: Option<String>,
    pub error: Option<String>,
}

fn notice_text(code: &str) -> String {
    match code {
        "subscribed" => "Your plan is active.",
        "subscription_declined" => "The subscription was declined.",
        "cancelled" => "Your subscription was cancelled.",
        "usage_recorded" => "Usage charge recorded.",
        "purchased" => "Purchase complete.",
        "purchase_declined" => "The purchase was declined.",
        "discount_created" => "Discount created.",
        "discount_updated" => "Discount updated.",
        "discount_deleted" => "Discount deleted.",
        "metafields_saved" => "Metafields saved.",
        "metafields_deleted" => "Metafield deleted.",
        "metafields_delete_failed" => "Shopify didn't delete that metafield.",
        "job_retried" => "Job queued for another attempt.",
        "report_queued" => "Report queued. It will appear under Files when ready.",
        "uploaded" => "File uploaded.",
        "image_queued" => "File uploaded. Sending it to Shopify Files in the background.",
        "installed" => "Storekeep is installed.",
        _ => "Something went wrong. Please try again.",
    }
    .to_string()
}

/// Render a template fragment, logging render failures.
pub fn render<T: Template>(template: &T) -> Response {
    Html(template.render().unwrap_or_else(|e| {
        tracing::error!("Template render error: {}", e);
        "Internal Server Error".to_string()
    }))
    .into_response()
}

/// Format a timestamp for tables.
#[must_use]
pub fn format_datetime(at: DateTime<Utc>) -> String {
    at.format("%b %-d, %Y %H:%M UTC").to_string()
}

/// Format a date for tables.
#[must_use]
pub fn format_date(at: DateTime<Utc>) -> String {
    at.format("%b %-d, %Y").to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_notice_text() {
        assert_eq!(notice_text("subscribed"), "Your plan is active.");
        assert_eq!(
            notice_text("made-up"),
            "Something went wrong. Please try again."
        );
    }

    #[test]
    fn test_format_datetime() {
        let at = Utc.with_ymd_and_hms(2026, 3, 7, 9, 5, 0).unwrap();
        assert_eq!(format_datetime(at), "Mar 7, 2026 09:05 UTC");
        assert_eq!(format_date(at), "Mar 7, 2026");
    }
}
