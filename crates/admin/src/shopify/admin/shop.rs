//! Shop details.

use tracing::instrument;

use super::{AdminClient, AdminShopifyError, queries::NoVariables, queries::shop::GetShop};
use crate::shopify::types::ShopInfo;

impl AdminClient {
    /// Fetch the shop's name, contact email, currency and plan.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(shop = %self.shop()))]
    pub async fn get_shop(&self) -> Result<ShopInfo, AdminShopifyError> {
        let response = self.execute::<GetShop>(NoVariables {}).await?;
        let shop = response.shop;
        let (plan_name, partner_development) = shop
            .plan
            .map_or((None, false), |p| (p.display_name, p.partner_development));

        Ok(ShopInfo {
            name: shop.name,
            email: shop.email.filter(|e| !e.trim().is_empty()),
            currency_code: shop.currency_code,
            myshopify_domain: shop.myshopify_domain,
            plan_name,
            partner_development,
        })
    }
}
