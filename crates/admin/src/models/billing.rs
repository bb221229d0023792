//! Plans, subscriptions, usage charges, one-time purchases and coupons.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use storekeep_core::{
    BillingInterval, CouponId, CouponKind, Money, OneTimePurchaseId, PlanId, PurchaseStatus,
    ShopId, SubscriptionId, SubscriptionStatus, UsageChargeId,
};

/// A pricing plan offered on the billing page.
#[derive(Debug, Clone)]
pub struct Plan {
    pub id: PlanId,
    pub handle: String,
    pub name: String,
    pub price: Money,
    pub interval: BillingInterval,
    pub trial_days: i32,
    /// Usage cap per interval; `Some` enables usage charges.
    pub capped_amount: Option<Money>,
    pub usage_terms: Option<String>,
    pub features: Vec<String>,
    pub position: i32,
    pub active: bool,
}

impl Plan {
    /// Usage charges need a cap and a 30-day interval.
    #[must_use]
    pub const fn has_usage_billing(&self) -> bool {
        self.capped_amount.is_some() && matches!(self.interval, BillingInterval::Every30Days)
    }
}

/// A recurring subscription created for a shop.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub shop_id: ShopId,
    pub plan_id: PlanId,
    /// `gid://shopify/AppSubscription/<n>`
    pub shopify_id: String,
    /// GID of the usage line item, present when the plan has a cap.
    pub usage_line_item_id: Option<String>,
    pub name: String,
    pub status: SubscriptionStatus,
    /// Recurring price after any coupon discount.
    pub price: Money,
    pub capped_amount: Option<Money>,
    pub trial_days: i32,
    pub test: bool,
    pub coupon_id: Option<CouponId>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub activated_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Days of trial consumed as of `now`.
    ///
    /// Counts whole days since activation, bounded by the trial length.
    /// Subscriptions never activated used none of their trial.
    #[must_use]
    pub fn trial_days_used(&self, now: DateTime<Utc>) -> i32 {
        let Some(activated_at) = self.activated_at else {
            return 0;
        };
        let end = self.cancelled_at.unwrap_or(now).min(now);
        let days = (end - activated_at).num_days().max(0);
        i32::try_from(days).unwrap_or(i32::MAX).min(self.trial_days)
    }

    /// Whether usage charges can be recorded against this subscription.
    #[must_use]
    pub const fn accepts_usage(&self) -> bool {
        self.status.is_billable() && self.usage_line_item_id.is_some()
    }
}

/// A metered charge recorded against a subscription.
#[derive(Debug, Clone)]
pub struct UsageCharge {
    pub id: UsageChargeId,
    pub subscription_id: SubscriptionId,
    pub shopify_id: String,
    pub description: String,
    pub price: Money,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

/// A one-time app charge.
#[derive(Debug, Clone)]
pub struct OneTimePurchase {
    pub id: OneTimePurchaseId,
    pub shop_id: ShopId,
    pub shopify_id: String,
    pub name: String,
    pub price: Money,
    pub status: PurchaseStatus,
    pub test: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An app-level promo code.
#[derive(Debug, Clone)]
pub struct Coupon {
    pub id: CouponId,
    pub code: String,
    pub kind: CouponKind,
    /// Percentage (0-100) or fixed amount, depending on `kind`.
    pub value: Decimal,
    /// Number of billing intervals the discount lasts; `None` is forever.
    pub duration_intervals: Option<i32>,
    /// Restricts the coupon to one plan.
    pub plan_id: Option<PlanId>,
    pub max_redemptions: Option<i32>,
    pub redemptions: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a coupon.
#[derive(Debug, Clone)]
pub struct NewCoupon {
    pub code: String,
    pub kind: CouponKind,
    pub value: Decimal,
    pub duration_intervals: Option<i32>,
    pub plan_id: Option<PlanId>,
    pub max_redemptions: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;
    use storekeep_core::CurrencyCode;

    use super::*;

    fn subscription(trial_days: i32) -> Subscription {
        Subscription {
            id: SubscriptionId::new(1),
            shop_id: ShopId::new(1),
            plan_id: PlanId::new(1),
            shopify_id: "gid://shopify/AppSubscription/1".to_string(),
            usage_line_item_id: None,
            name: "Pro".to_string(),
            status: SubscriptionStatus::Active,
            price: Money::zero(CurrencyCode::USD),
            capped_amount: None,
            trial_days,
            test: true,
            coupon_id: None,
            current_period_end: None,
            activated_at: None,
            cancelled_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_trial_days_used_never_activated() {
        assert_eq!(subscription(14).trial_days_used(Utc::now()), 0);
    }

    #[test]
    fn test_trial_days_used_counts_until_cancel() {
        let now = Utc::now();
        let mut sub = subscription(14);
        sub.activated_at = Some(now - Duration::days(10));
        sub.cancelled_at = Some(now - Duration::days(6));
        assert_eq!(sub.trial_days_used(now), 4);
    }

    #[test]
    fn test_trial_days_used_is_capped_by_trial() {
        let now = Utc::now();
        let mut sub = subscription(7);
        sub.activated_at = Some(now - Duration::days(30));
        assert_eq!(sub.trial_days_used(now), 7);
    }

    #[test]
    fn test_accepts_usage_requires_line_item() {
        let mut sub = subscription(0);
        assert!(!sub.accepts_usage());
        sub.usage_line_item_id = Some("gid://shopify/AppSubscriptionLineItem/9".to_string());
        assert!(sub.accepts_usage());
        sub.status = SubscriptionStatus::Frozen;
        assert!(!sub.accepts_usage());
    }
}
