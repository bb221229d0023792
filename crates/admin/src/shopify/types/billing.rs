//! App billing types (subscriptions, usage records, one-time purchases).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use storekeep_core::{BillingInterval, Money, PurchaseStatus, SubscriptionStatus};

/// A recurring app subscription as the billing API reports it.
#[derive(Debug, Clone)]
pub struct AppSubscription {
    /// `gid://shopify/AppSubscription/<n>`
    pub id: String,
    pub name: String,
    pub status: SubscriptionStatus,
    pub test: bool,
    pub trial_days: i32,
    pub current_period_end: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    /// Recurring price before discounts.
    pub recurring_price: Option<Money>,
    pub interval: Option<BillingInterval>,
    /// Line item that accepts usage records.
    pub usage_line_item_id: Option<String>,
    pub capped_amount: Option<Money>,
    pub balance_used: Option<Money>,
}

/// Discount value applied to a recurring line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionDiscountValue {
    /// Percentage off, 0-100.
    Percentage(Decimal),
    /// Fixed amount off in the plan's currency.
    Amount(Decimal),
}

/// Discount attached to a subscription request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionDiscount {
    pub value: SubscriptionDiscountValue,
    /// Number of intervals the discount lasts; `None` is forever.
    pub duration_intervals: Option<i32>,
}

/// Usage line item of a subscription request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsagePricing {
    pub capped_amount: Money,
    pub terms: String,
}

/// Everything needed to call `appSubscriptionCreate`.
#[derive(Debug, Clone)]
pub struct SubscriptionRequest {
    pub name: String,
    pub return_url: String,
    pub test: bool,
    pub trial_days: i32,
    pub price: Money,
    pub interval: BillingInterval,
    pub discount: Option<SubscriptionDiscount>,
    pub usage: Option<UsagePricing>,
}

/// Result of `appSubscriptionCreate`: the pending subscription and where to send the merchant.
#[derive(Debug, Clone)]
pub struct CreatedSubscription {
    pub subscription: AppSubscription,
    pub confirmation_url: String,
}

/// A usage record created on a usage line item.
#[derive(Debug, Clone)]
pub struct UsageRecord {
    pub id: String,
    pub description: String,
    pub price: Money,
    pub created_at: Option<DateTime<Utc>>,
}

/// A one-time app purchase.
#[derive(Debug, Clone)]
pub struct AppPurchase {
    pub id: String,
    pub name: String,
    pub status: PurchaseStatus,
    pub test: bool,
    pub price: Option<Money>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Result of `appPurchaseOneTimeCreate`.
#[derive(Debug, Clone)]
pub struct CreatedPurchase {
    pub purchase: AppPurchase,
    pub confirmation_url: String,
}

/// Billing state of the current app installation.
#[derive(Debug, Clone, Default)]
pub struct InstallationBilling {
    /// Subscriptions Shopify reports as active.
    pub subscriptions: Vec<AppSubscription>,
    /// Most recent one-time purchases, newest first.
    pub purchases: Vec<AppPurchase>,
}
