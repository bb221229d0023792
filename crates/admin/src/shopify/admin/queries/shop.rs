//! Shop queries.

use serde::Deserialize;

use super::{NoVariables, operation};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopPlan {
    pub display_name: Option<String>,
    #[serde(default)]
    pub partner_development: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopNode {
    pub name: String,
    pub email: Option<String>,
    pub currency_code: String,
    pub myshopify_domain: String,
    pub plan: Option<ShopPlan>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetShopData {
    pub shop: ShopNode,
}

operation!(
    GetShop,
    "GetShop",
    NoVariables,
    GetShopData,
    r"query GetShop {
  shop {
    name
    email
    currencyCode
    myshopifyDomain
    plan { displayName partnerDevelopment }
  }
}"
);
