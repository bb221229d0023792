//! Shop installation.
//!
//! Both install paths end here: the OAuth callback and the session token
//! exchange done by the embedded auth extractor.

use std::time::Duration;

use storekeep_core::{CurrencyCode, Email, ShopDomain};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::db::{RepositoryError, ShopRepository};
use crate::models::Shop;
use crate::queue::{EmailJob, QueueError};
use crate::services::EmailMessage;
use crate::shopify::{AccessToken, AdminShopifyError};
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Shopify error: {0}")]
    Shopify(#[from] AdminShopifyError),

    #[error("failed to queue welcome email: {0}")]
    Queue(#[from] QueueError),
}

/// Store the offline token, refresh shop details and greet first installs.
///
/// # Errors
///
/// Returns an error if the shop can't be saved. Failing to read shop details
/// only logs a warning.
#[instrument(skip(state, token), fields(shop = %domain))]
pub async fn complete_install(
    state: &AppState,
    domain: &ShopDomain,
    token: AccessToken,
) -> Result<Shop, InstallError> {
    let shops = ShopRepository::new(state.pool());
    let previous = shops.get_by_domain(domain).await?;
    let fresh_install = previous.as_ref().is_none_or(|shop| !shop.is_installed());

    let mut shop = shops
        .upsert_installed(domain, &token.access_token, &token.scopes)
        .await?;

    let client = state.shopify().client(domain, token.access_token);
    match client.get_shop().await {
        Ok(info) => {
            let email = info.email.as_deref().and_then(|e| Email::parse(e).ok());
            let currency = info
                .currency_code
                .parse::<CurrencyCode>()
                .unwrap_or(shop.currency_code);
            shops
                .update_details(shop.id, &info.name, email.as_ref(), currency)
                .await?;
            shop.name = Some(info.name);
            shop.email = email;
            shop.currency_code = currency;
        }
        Err(e) => warn!(error = %e, "Failed to read shop details after install"),
    }

    state.invalidate_shop(domain).await;
    info!(fresh_install, scopes = %shop.scopes.join(","), "Shop installed");

    if fresh_install {
        if let Some(email) = &shop.email {
            let job = EmailJob {
                to: email.clone(),
                message: EmailMessage::Welcome {
                    shop_name: shop.display_name().to_string(),
                    admin_url: domain.admin_app_url(state.shopify().api_key()),
                },
                attachment: None,
            };
            state
                .queue()
                .enqueue(Some(shop.id), &job, Duration::ZERO)
                .await?;
        }
    }

    Ok(shop)
}
