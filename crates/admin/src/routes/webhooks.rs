//! Shopify webhook receiver.
//!
//! Every topic is delivered to `POST /webhooks`. The body is verified against
//! `X-Shopify-Hmac-Sha256` before anything is parsed.

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use storekeep_core::ShopDomain;
use tracing::{debug, info, instrument, warn};

use crate::db::{ShopRepository, SubscriptionRepository};
use crate::error::AppError;
use crate::services::{SubscriptionWebhook, sync_from_webhook};
use crate::state::AppState;

const HMAC_HEADER: &str = "X-Shopify-Hmac-Sha256";
const TOPIC_HEADER: &str = "X-Shopify-Topic";
const SHOP_HEADER: &str = "X-Shopify-Shop-Domain";

pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks", post(receive))
}

/// Topics the app subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookTopic {
    AppUninstalled,
    AppSubscriptionsUpdate,
    CustomersDataRequest,
    CustomersRedact,
    ShopRedact,
}

impl WebhookTopic {
    #[must_use]
    pub fn parse(topic: &str) -> Option<Self> {
        match topic {
            "app/uninstalled" => Some(Self::AppUninstalled),
            "app_subscriptions/update" => Some(Self::AppSubscriptionsUpdate),
            "customers/data_request" => Some(Self::CustomersDataRequest),
            "customers/redact" => Some(Self::CustomersRedact),
            "shop/redact" => Some(Self::ShopRedact),
            _ => None,
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// POST /webhooks - Verify and dispatch by topic.
#[instrument(skip(state, headers, body), fields(topic, shop))]
async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let signature = header(&headers, HMAC_HEADER)
        .ok_or_else(|| AppError::Unauthorized("Missing webhook signature".to_string()))?;
    if !state.shopify().verify_webhook_hmac(&body, signature) {
        warn!("Invalid webhook signature");
        return Err(AppError::Unauthorized("Invalid webhook signature".to_string()));
    }

    let topic = header(&headers, TOPIC_HEADER).unwrap_or_default();
    let span = tracing::Span::current();
    span.record("topic", topic);

    let shop = header(&headers, SHOP_HEADER)
        .ok_or_else(|| AppError::BadRequest("Missing shop domain header".to_string()))
        .and_then(|s| {
            ShopDomain::parse(s).map_err(|e| AppError::BadRequest(format!("Invalid shop: {e}")))
        })?;
    span.record("shop", shop.as_str());

    let Some(parsed) = WebhookTopic::parse(topic) else {
        info!("Ignoring webhook with unhandled topic");
        return Ok(StatusCode::OK);
    };

    match parsed {
        WebhookTopic::AppUninstalled => app_uninstalled(&state, &shop).await?,
        WebhookTopic::AppSubscriptionsUpdate => subscription_update(&state, &shop, &body).await?,
        WebhookTopic::CustomersDataRequest => {
            info!("Customer data request received; no customer data is stored");
        }
        WebhookTopic::CustomersRedact => {
            info!("Customer redact received; no customer data is stored");
        }
        WebhookTopic::ShopRedact => shop_redact(&state, &shop).await?,
    }

    Ok(StatusCode::OK)
}

async fn app_uninstalled(state: &AppState, shop: &ShopDomain) -> Result<(), AppError> {
    let Some(shop_id) = ShopRepository::new(state.pool())
        .mark_uninstalled(shop)
        .await?
    else {
        debug!("Uninstall for unknown shop");
        return Ok(());
    };

    let cancelled = SubscriptionRepository::new(state.pool())
        .cancel_all_for_shop(shop_id)
        .await?;
    state.invalidate_shop(shop).await;

    info!(cancelled, "Shop uninstalled");
    Ok(())
}

async fn subscription_update(
    state: &AppState,
    shop: &ShopDomain,
    body: &[u8],
) -> Result<(), AppError> {
    let payload: SubscriptionWebhook = serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid subscription payload: {e}")))?;

    let Some(record) = ShopRepository::new(state.pool()).get_by_domain(shop).await? else {
        debug!("Subscription update for unknown shop");
        return Ok(());
    };

    match sync_from_webhook(state.pool(), &record, &payload).await? {
        Some(subscription) => {
            info!(subscription_id = %subscription.id, status = %subscription.status, "Subscription synced");
        }
        None => debug!(
            charge = %payload.app_subscription.admin_graphql_api_id,
            "Subscription update for a charge this app didn't create"
        ),
    }
    Ok(())
}

async fn shop_redact(state: &AppState, shop: &ShopDomain) -> Result<(), AppError> {
    let repo = ShopRepository::new(state.pool());
    let Some(record) = repo.get_by_domain(shop).await? else {
        debug!("Redact for unknown shop");
        return Ok(());
    };

    state.files().delete_shop(record.id).await?;
    let deleted = repo.delete_by_domain(shop).await?;
    state.invalidate_shop(shop).await;

    info!(deleted, "Shop data erased");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_topic_parse() {
        assert_eq!(
            WebhookTopic::parse("app/uninstalled"),
            Some(WebhookTopic::AppUninstalled)
        );
        assert_eq!(
            WebhookTopic::parse("app_subscriptions/update"),
            Some(WebhookTopic::AppSubscriptionsUpdate)
        );
        assert_eq!(WebhookTopic::parse("shop/redact"), Some(WebhookTopic::ShopRedact));
        assert_eq!(WebhookTopic::parse("orders/create"), None);
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("x-shopify-topic", HeaderValue::from_static("shop/redact"));
        assert_eq!(header(&headers, TOPIC_HEADER), Some("shop/redact"));
        assert_eq!(header(&headers, SHOP_HEADER), None);
    }

    #[test]
    fn test_subscription_payload_parses() {
        let body = br#"{"app_subscription":{"admin_graphql_api_id":"gid://shopify/AppSubscription/1","name":"Pro","status":"ACTIVE","admin_graphql_api_shop_id":"gid://shopify/Shop/2"}}"#;
        let payload: SubscriptionWebhook = serde_json::from_slice(body).unwrap();
        assert_eq!(payload.app_subscription.status, "ACTIVE");
    }
}
