//! Promo code validation for app subscriptions.
//!
//! Coupons are app-level codes (not store discounts): they reduce the
//! recurring price of a plan through the subscription's `discount` input.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use storekeep_core::{CouponId, CouponKind, Money};
use thiserror::Error;

use crate::models::{Coupon, Plan};
use crate::shopify::types::{SubscriptionDiscount, SubscriptionDiscountValue};

/// Why a promo code cannot be applied. Messages are shown to merchants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CouponRejection {
    #[error("That promo code doesn't exist.")]
    NotFound,
    #[error("That promo code is no longer active.")]
    Inactive,
    #[error("That promo code has expired.")]
    Expired,
    #[error("That promo code has reached its redemption limit.")]
    Exhausted,
    #[error("That promo code isn't valid for this plan.")]
    WrongPlan,
    #[error("You've already used that promo code.")]
    AlreadyRedeemed,
}

/// A validated coupon, ready to apply to a plan price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedDiscount {
    pub coupon_id: CouponId,
    pub code: String,
    pub kind: CouponKind,
    pub value: Decimal,
    /// Number of billing intervals the discount lasts; `None` is forever.
    pub duration_intervals: Option<i32>,
}

impl AppliedDiscount {
    /// The discounted price, never below zero.
    #[must_use]
    pub fn apply(&self, price: Money) -> Money {
        match self.kind {
            CouponKind::Percentage => price.percent_off(self.value),
            CouponKind::FixedAmount => Money::new(
                (price.amount - self.value).max(Decimal::ZERO),
                price.currency_code,
            )
            .rounded(),
        }
    }

    /// The discount in the billing API's terms.
    ///
    /// A fixed amount larger than the price is clamped to the price.
    #[must_use]
    pub fn to_subscription_discount(&self, price: Money) -> SubscriptionDiscount {
        let value = match self.kind {
            CouponKind::Percentage => SubscriptionDiscountValue::Percentage(
                self.value.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED),
            ),
            CouponKind::FixedAmount => {
                SubscriptionDiscountValue::Amount(self.value.min(price.amount).max(Decimal::ZERO))
            }
        };
        SubscriptionDiscount {
            value,
            duration_intervals: self.duration_intervals,
        }
    }

    /// Short human description, e.g. "20% off for 3 months".
    #[must_use]
    pub fn describe(&self, price: Money) -> String {
        let amount = match self.kind {
            CouponKind::Percentage => format!("{}% off", self.value.normalize()),
            CouponKind::FixedAmount => {
                format!("{} off", Money::new(self.value, price.currency_code).display())
            }
        };
        match self.duration_intervals {
            Some(1) => format!("{amount} for the first billing cycle"),
            Some(n) => format!("{amount} for {n} billing cycles"),
            None => format!("{amount} forever"),
        }
    }
}

/// Check whether `coupon` can be applied to `plan` for a shop.
///
/// # Errors
///
/// Returns the first rule the coupon breaks, checked in the order: inactive,
/// expired, exhausted, wrong plan, already redeemed.
pub fn validate_coupon(
    coupon: &Coupon,
    plan: &Plan,
    shop_already_redeemed: bool,
    now: DateTime<Utc>,
) -> Result<AppliedDiscount, CouponRejection> {
    if !coupon.active {
        return Err(CouponRejection::Inactive);
    }
    if coupon.expires_at.is_some_and(|at| at <= now) {
        return Err(CouponRejection::Expired);
    }
    if coupon
        .max_redemptions
        .is_some_and(|max| coupon.redemptions >= max)
    {
        return Err(CouponRejection::Exhausted);
    }
    if coupon.plan_id.is_some_and(|id| id != plan.id) {
        return Err(CouponRejection::WrongPlan);
    }
    if shop_already_redeemed {
        return Err(CouponRejection::AlreadyRedeemed);
    }

    Ok(AppliedDiscount {
        coupon_id: coupon.id,
        code: coupon.code.clone(),
        kind: coupon.kind,
        value: coupon.value,
        duration_intervals: coupon.duration_intervals,
    })
}

/// Normalise a merchant-entered code for lookup.
#[must_use]
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;
    use storekeep_core::{BillingInterval, CurrencyCode, PlanId};

    use super::*;

    fn usd(amount: &str) -> Money {
        Money::parse(amount, "USD").unwrap()
    }

    fn plan() -> Plan {
        Plan {
            id: PlanId::new(1),
            handle: "growth".to_string(),
            name: "Growth".to_string(),
            price: usd("29.00"),
            interval: BillingInterval::Every30Days,
            trial_days: 7,
            capped_amount: None,
            usage_terms: None,
            features: vec![],
            position: 0,
            active: true,
        }
    }

    fn coupon(kind: CouponKind, value: i64) -> Coupon {
        Coupon {
            id: CouponId::new(3),
            code: "LAUNCH".to_string(),
            kind,
            value: Decimal::from(value),
            duration_intervals: Some(3),
            plan_id: None,
            max_redemptions: Some(10),
            redemptions: 0,
            expires_at: None,
            active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_valid_coupon_applies() {
        let applied =
            validate_coupon(&coupon(CouponKind::Percentage, 20), &plan(), false, Utc::now())
                .unwrap();
        assert_eq!(applied.apply(usd("29.00")).amount, Decimal::new(2320, 2));
        assert_eq!(applied.describe(usd("29.00")), "20% off for 3 billing cycles");
    }

    #[test]
    fn test_rejection_order() {
        let now = Utc::now();
        let plan = plan();

        let mut c = coupon(CouponKind::Percentage, 20);
        c.active = false;
        c.expires_at = Some(now - Duration::days(1));
        assert_eq!(validate_coupon(&c, &plan, true, now), Err(CouponRejection::Inactive));

        c.active = true;
        assert_eq!(validate_coupon(&c, &plan, true, now), Err(CouponRejection::Expired));

        c.expires_at = Some(now + Duration::days(1));
        c.redemptions = 10;
        assert_eq!(validate_coupon(&c, &plan, true, now), Err(CouponRejection::Exhausted));

        c.redemptions = 9;
        c.plan_id = Some(PlanId::new(2));
        assert_eq!(validate_coupon(&c, &plan, true, now), Err(CouponRejection::WrongPlan));

        c.plan_id = Some(plan.id);
        assert_eq!(
            validate_coupon(&c, &plan, true, now),
            Err(CouponRejection::AlreadyRedeemed)
        );
        assert!(validate_coupon(&c, &plan, false, now).is_ok());
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let now = Utc::now();
        let mut c = coupon(CouponKind::Percentage, 20);
        c.expires_at = Some(now);
        assert_eq!(validate_coupon(&c, &plan(), false, now), Err(CouponRejection::Expired));
    }

    #[test]
    fn test_fixed_amount_floors_at_zero() {
        let applied =
            validate_coupon(&coupon(CouponKind::FixedAmount, 50), &plan(), false, Utc::now())
                .unwrap();
        assert_eq!(applied.apply(usd("29.00")).amount, Decimal::ZERO);
        assert_eq!(
            applied.to_subscription_discount(usd("29.00")).value,
            SubscriptionDiscountValue::Amount(Decimal::new(2900, 2))
        );
    }

    #[test]
    fn test_describe_forever_fixed() {
        let mut c = coupon(CouponKind::FixedAmount, 5);
        c.duration_intervals = None;
        let applied = validate_coupon(&c, &plan(), false, Utc::now()).unwrap();
        assert_eq!(
            applied.describe(Money::zero(CurrencyCode::USD)),
            "$5.00 USD off forever"
        );
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("  launch-10 "), "LAUNCH-10");
    }
}
