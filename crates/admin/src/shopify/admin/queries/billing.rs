//! App billing operations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{IdVariables, NoVariables, Nodes, operation};
use crate::shopify::types::{MoneyV2, UserError};

macro_rules! subscription_fields {
    () => {
        r"
fragment SubscriptionFields on AppSubscription {
  id
  name
  status
  test
  trialDays
  currentPeriodEnd
  createdAt
  lineItems {
    id
    plan {
      pricingDetails {
        __typename
        ... on AppRecurringPricing { interval price { amount currencyCode } }
        ... on AppUsagePricing {
          terms
          cappedAmount { amount currencyCode }
          balanceUsed { amount currencyCode }
        }
      }
    }
  }
}"
    };
}

macro_rules! purchase_fields {
    () => {
        r"
fragment PurchaseFields on AppPurchaseOneTime {
  id
  name
  status
  test
  createdAt
  price { amount currencyCode }
}"
    };
}

// -----------------------------------------------------------------------------
// Shared response shapes
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PricingDetails {
    #[serde(rename = "__typename")]
    pub typename: String,
    pub interval: Option<String>,
    pub price: Option<MoneyV2>,
    pub terms: Option<String>,
    pub capped_amount: Option<MoneyV2>,
    pub balance_used: Option<MoneyV2>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LineItemPlan {
    pub pricing_details: PricingDetails,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LineItem {
    pub id: String,
    pub plan: LineItemPlan,
}

/// `SubscriptionFields`; every field defaults so a `node` of another type
/// decodes to an empty value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubscriptionNode {
    pub id: String,
    pub name: String,
    pub status: String,
    pub test: bool,
    pub trial_days: i32,
    pub current_period_end: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub line_items: Vec<LineItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PurchaseNode {
    pub id: String,
    pub name: String,
    pub status: String,
    pub test: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub price: Option<MoneyV2>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoneyInput {
    pub amount: Decimal,
    pub currency_code: String,
}

// -----------------------------------------------------------------------------
// appSubscriptionCreate
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountValueInput {
    /// Fraction between 0 and 1 (GraphQL `Float`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_limit_in_intervals: Option<i32>,
    pub value: DiscountValueInput,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringPricingInput {
    pub price: MoneyInput,
    pub interval: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount: Option<DiscountInput>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsagePricingInput {
    pub terms: String,
    pub capped_amount: MoneyInput,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_recurring_pricing_details: Option<RecurringPricingInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_usage_pricing_details: Option<UsagePricingInput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LineItemInput {
    pub plan: PlanInput,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSubscriptionCreateVariables {
    pub name: String,
    pub line_items: Vec<LineItemInput>,
    pub return_url: String,
    pub test: bool,
    pub trial_days: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSubscriptionCreatePayload {
    pub app_subscription: Option<SubscriptionNode>,
    pub confirmation_url: Option<String>,
    #[serde(default)]
    pub user_errors: Vec<UserError>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSubscriptionCreateData {
    pub app_subscription_create: Option<AppSubscriptionCreatePayload>,
}

operation!(
    AppSubscriptionCreate,
    "AppSubscriptionCreate",
    AppSubscriptionCreateVariables,
    AppSubscriptionCreateData,
    concat!(
        r"mutation AppSubscriptionCreate(
  $name: String!
  $lineItems: [AppSubscriptionLineItemInput!]!
  $returnUrl: URL!
  $test: Boolean
  $trialDays: Int
) {
  appSubscriptionCreate(
    name: $name
    lineItems: $lineItems
    returnUrl: $returnUrl
    test: $test
    trialDays: $trialDays
  ) {
    appSubscription { ...SubscriptionFields }
    confirmationUrl
    userErrors { field message }
  }
}",
        subscription_fields!()
    )
);

// -----------------------------------------------------------------------------
// appSubscriptionCancel
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct AppSubscriptionCancelVariables {
    pub id: String,
    pub prorate: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelledSubscription {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSubscriptionCancelPayload {
    pub app_subscription: Option<CancelledSubscription>,
    #[serde(default)]
    pub user_errors: Vec<UserError>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSubscriptionCancelData {
    pub app_subscription_cancel: Option<AppSubscriptionCancelPayload>,
}

operation!(
    AppSubscriptionCancel,
    "AppSubscriptionCancel",
    AppSubscriptionCancelVariables,
    AppSubscriptionCancelData,
    r"mutation AppSubscriptionCancel($id: ID!, $prorate: Boolean) {
  appSubscriptionCancel(id: $id, prorate: $prorate) {
    appSubscription { id status }
    userErrors { field message }
  }
}"
);

// -----------------------------------------------------------------------------
// Subscription / purchase lookups
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct GetSubscriptionData {
    pub node: Option<SubscriptionNode>,
}

operation!(
    GetSubscription,
    "GetSubscription",
    IdVariables,
    GetSubscriptionData,
    concat!(
        r"query GetSubscription($id: ID!) {
  node(id: $id) { ...SubscriptionFields }
}",
        subscription_fields!()
    )
);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentInstallation {
    #[serde(default)]
    pub active_subscriptions: Vec<SubscriptionNode>,
    pub one_time_purchases: Nodes<PurchaseNode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentInstallationData {
    pub current_app_installation: CurrentInstallation,
}

operation!(
    CurrentInstallationBilling,
    "CurrentInstallationBilling",
    NoVariables,
    CurrentInstallationData,
    concat!(
        r"query CurrentInstallationBilling {
  currentAppInstallation {
    activeSubscriptions { ...SubscriptionFields }
    oneTimePurchases(first: 25, reverse: true) { nodes { ...PurchaseFields } }
  }
}",
        subscription_fields!(),
        purchase_fields!()
    )
);

#[derive(Debug, Clone, Deserialize)]
pub struct GetPurchaseData {
    pub node: Option<PurchaseNode>,
}

operation!(
    GetPurchase,
    "GetPurchase",
    IdVariables,
    GetPurchaseData,
    concat!(
        r"query GetPurchase($id: ID!) {
  node(id: $id) { ...PurchaseFields }
}",
        purchase_fields!()
    )
);

// -----------------------------------------------------------------------------
// appUsageRecordCreate
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppUsageRecordCreateVariables {
    pub subscription_line_item_id: String,
    pub price: MoneyInput,
    pub description: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecordNode {
    pub id: String,
    pub description: String,
    pub price: MoneyV2,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppUsageRecordCreatePayload {
    pub app_usage_record: Option<UsageRecordNode>,
    #[serde(default)]
    pub user_errors: Vec<UserError>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppUsageRecordCreateData {
    pub app_usage_record_create: Option<AppUsageRecordCreatePayload>,
}

operation!(
    AppUsageRecordCreate,
    "AppUsageRecordCreate",
    AppUsageRecordCreateVariables,
    AppUsageRecordCreateData,
    r"mutation AppUsageRecordCreate(
  $subscriptionLineItemId: ID!
  $price: MoneyInput!
  $description: String!
  $idempotencyKey: String
) {
  appUsageRecordCreate(
    subscriptionLineItemId: $subscriptionLineItemId
    price: $price
    description: $description
    idempotencyKey: $idempotencyKey
  ) {
    appUsageRecord { id description createdAt price { amount currencyCode } }
    userErrors { field message }
  }
}"
);

// -----------------------------------------------------------------------------
// appPurchaseOneTimeCreate
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppPurchaseOneTimeCreateVariables {
    pub name: String,
    pub price: MoneyInput,
    pub return_url: String,
    pub test: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppPurchaseOneTimeCreatePayload {
    pub app_purchase_one_time: Option<PurchaseNode>,
    pub confirmation_url: Option<String>,
    #[serde(default)]
    pub user_errors: Vec<UserError>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppPurchaseOneTimeCreateData {
    pub app_purchase_one_time_create: Option<AppPurchaseOneTimeCreatePayload>,
}

operation!(
    AppPurchaseOneTimeCreate,
    "AppPurchaseOneTimeCreate",
    AppPurchaseOneTimeCreateVariables,
    AppPurchaseOneTimeCreateData,
    concat!(
        r"mutation AppPurchaseOneTimeCreate(
  $name: String!
  $price: MoneyInput!
  $returnUrl: URL!
  $test: Boolean
) {
  appPurchaseOneTimeCreate(name: $name, price: $price, returnUrl: $returnUrl, test: $test) {
    appPurchaseOneTime { ...PurchaseFields }
    confirmationUrl
    userErrors { field message }
  }
}",
        purchase_fields!()
    )
);
