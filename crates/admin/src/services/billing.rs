//! App billing: plan subscriptions, usage charges and one-time purchases.
//!
//! Every charge goes through the billing API first; the local tables mirror
//! what Shopify reports so pages and reports don't need a round trip.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use storekeep_core::{BillingInterval, Money, MoneyError, PurchaseStatus, SubscriptionStatus};
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::coupons::{AppliedDiscount, CouponRejection, normalize_code, validate_coupon};
use crate::config::AppConfig;
use crate::db::{
    CouponRepository, NewSubscription, PlanRepository, PurchaseRepository, RepositoryError,
    SubscriptionRepository,
};
use crate::models::{OneTimePurchase, Plan, Shop, Subscription, UsageCharge};
use crate::shopify::{AdminClient, AdminShopifyError, SubscriptionRequest, UsagePricing, to_gid};

/// Length of a usage billing period.
const USAGE_PERIOD_DAYS: i64 = 30;

/// Largest single charge, in whole currency units.
pub const MAX_CHARGE_UNITS: i64 = 1_000_000;

/// Errors from billing operations.
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Shopify error: {0}")]
    Shopify(#[from] AdminShopifyError),

    #[error("{0}")]
    Money(#[from] MoneyError),

    #[error("That plan isn't available.")]
    PlanNotFound,

    #[error("There is no active subscription.")]
    NoSubscription,

    #[error("The current plan doesn't include usage billing.")]
    UsageNotEnabled,

    #[error("This charge would exceed the usage cap; {} remaining this period.", remaining.display())]
    UsageCapExceeded { remaining: Money },

    #[error("Amount must be greater than zero.")]
    InvalidAmount,

    #[error("Amount can be at most {MAX_CHARGE_UNITS}.")]
    AmountTooLarge,

    #[error("{0}")]
    Coupon(#[from] CouponRejection),

    #[error("That charge doesn't belong to this shop.")]
    UnknownCharge,
}

impl BillingError {
    /// Whether the error was caused by merchant input rather than a failure.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::PlanNotFound
                | Self::NoSubscription
                | Self::UsageNotEnabled
                | Self::UsageCapExceeded { .. }
                | Self::InvalidAmount
                | Self::AmountTooLarge
                | Self::Money(MoneyError::Overflow | MoneyError::TooPrecise(..))
                | Self::Coupon(_)
                | Self::UnknownCharge
                | Self::Shopify(AdminShopifyError::UserErrors(_))
        )
    }

    /// Banner text for client errors; `None` for failures that stay internal.
    #[must_use]
    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::Shopify(e @ AdminShopifyError::UserErrors(_)) => Some(e.user_messages().join(" ")),
            e if e.is_client_error() => Some(e.to_string()),
            _ => None,
        }
    }
}

/// Usage consumed in the current period of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageSummary {
    pub used: Money,
    pub cap: Money,
    pub remaining: Money,
    /// 0-100, rounded.
    pub percent_used: u8,
    pub period_start: DateTime<Utc>,
}

impl UsageSummary {
    /// Summarise `used` against `cap`.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::CurrencyMismatch` when the currencies differ.
    pub fn new(used: Money, cap: Money, period_start: DateTime<Utc>) -> Result<Self, MoneyError> {
        Ok(Self {
            used,
            cap,
            remaining: cap.saturating_sub(used)?,
            percent_used: used.percent_of(cap),
            period_start,
        })
    }
}

/// A charge waiting for the merchant's approval.
#[derive(Debug, Clone)]
pub struct PendingCharge {
    pub confirmation_url: String,
    pub discount: Option<AppliedDiscount>,
}

/// What a promo code would do to a plan's price.
#[derive(Debug, Clone)]
pub struct CouponPreview {
    pub plan: Plan,
    pub discount: AppliedDiscount,
    pub discounted_price: Money,
    pub description: String,
}

/// Body of the `app_subscriptions/update` webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionWebhook {
    pub app_subscription: SubscriptionWebhookBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionWebhookBody {
    /// `gid://shopify/AppSubscription/<n>`
    pub admin_graphql_api_id: String,
    #[serde(default)]
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub admin_graphql_api_shop_id: Option<String>,
}

/// Trial days left for a new subscription.
///
/// Days consumed by the shop's earlier subscriptions count against the
/// plan's trial so re-subscribing can't restart it.
#[must_use]
pub fn remaining_trial_days(plan_trial_days: i32, prior: &[Subscription], now: DateTime<Utc>) -> i32 {
    let used: i32 = prior
        .iter()
        .map(|s| s.trial_days_used(now))
        .fold(0, i32::saturating_add);
    plan_trial_days.saturating_sub(used).max(0)
}

/// Start of the subscription's current usage period.
#[must_use]
pub fn usage_period_start(subscription: &Subscription) -> DateTime<Utc> {
    subscription.current_period_end.map_or_else(
        || subscription.activated_at.unwrap_or(subscription.created_at),
        |end| end - Duration::days(USAGE_PERIOD_DAYS),
    )
}

/// Validate a merchant-entered charge amount.
///
/// # Errors
///
/// Returns `InvalidAmount` for non-positive amounts, `AmountTooLarge` above
/// [`MAX_CHARGE_UNITS`], or `MoneyError::TooPrecise` for fractions of a minor unit.
pub fn check_charge_amount(amount: Money) -> Result<Money, BillingError> {
    if !amount.is_positive() {
        return Err(BillingError::InvalidAmount);
    }
    if amount.amount > Decimal::from(MAX_CHARGE_UNITS) {
        return Err(BillingError::AmountTooLarge);
    }
    Ok(amount.in_minor_units()?)
}

/// Reject a usage charge that would push `used` past `cap`.
///
/// # Errors
///
/// Returns `UsageCapExceeded` with the remaining allowance, or a money error
/// when currencies differ.
pub fn check_usage_cap(used: Money, amount: Money, cap: Money) -> Result<(), BillingError> {
    let exceeds = match used.checked_add(amount) {
        Ok(total) => total.amount > cap.amount,
        Err(MoneyError::Overflow) => true,
        Err(e) => return Err(e.into()),
    };
    if exceeds {
        return Err(BillingError::UsageCapExceeded {
            remaining: cap.saturating_sub(used)?,
        });
    }
    Ok(())
}

/// Billing operations for one shop's requests.
pub struct BillingService<'a> {
    pool: &'a PgPool,
    shopify: &'a AdminClient,
    config: &'a AppConfig,
}

impl<'a> BillingService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, shopify: &'a AdminClient, config: &'a AppConfig) -> Self {
        Self {
            pool,
            shopify,
            config,
        }
    }

    /// Where the billing API sends the merchant after approving a charge.
    fn return_url(&self, shop: &Shop, path: &str) -> String {
        format!(
            "{}{path}",
            shop.domain.admin_app_url(&self.config.shopify.api_key)
        )
    }

    /// Active plans in display order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn plans(&self) -> Result<Vec<Plan>, BillingError> {
        Ok(PlanRepository::new(self.pool).list_active().await?)
    }

    /// The shop's current subscription, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn current_subscription(
        &self,
        shop: &Shop,
    ) -> Result<Option<Subscription>, BillingError> {
        Ok(SubscriptionRepository::new(self.pool)
            .current_for_shop(shop.id)
            .await?)
    }

    async fn active_plan(&self, handle: &str) -> Result<Plan, BillingError> {
        PlanRepository::new(self.pool)
            .get_by_handle(handle)
            .await?
            .filter(|p| p.active)
            .ok_or(BillingError::PlanNotFound)
    }

    async fn resolve_coupon(
        &self,
        shop: &Shop,
        plan: &Plan,
        code: &str,
    ) -> Result<AppliedDiscount, BillingError> {
        let repo = CouponRepository::new(self.pool);
        let coupon = repo
            .get_by_code(&normalize_code(code))
            .await?
            .ok_or(CouponRejection::NotFound)?;
        let redeemed = repo.has_redeemed(coupon.id, shop.id).await?;
        Ok(validate_coupon(&coupon, plan, redeemed, Utc::now())?)
    }

    /// Validate a promo code against a plan without starting a charge.
    ///
    /// # Errors
    ///
    /// Returns `Coupon` with the rejection reason, or `PlanNotFound`.
    pub async fn preview_coupon(
        &self,
        shop: &Shop,
        plan_handle: &str,
        code: &str,
    ) -> Result<CouponPreview, BillingError> {
        let plan = self.active_plan(plan_handle).await?;
        let discount = self.resolve_coupon(shop, &plan, code).await?;
        Ok(CouponPreview {
            discounted_price: discount.apply(plan.price),
            description: discount.describe(plan.price),
            discount,
            plan,
        })
    }

    /// Start a subscription to `plan_handle`, returning the approval URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan or coupon is invalid, the billing API
    /// rejects the request, or the database write fails.
    #[instrument(skip(self, shop), fields(shop = %shop.domain))]
    pub async fn subscribe(
        &self,
        shop: &Shop,
        plan_handle: &str,
        coupon_code: Option<&str>,
    ) -> Result<PendingCharge, BillingError> {
        let plan = self.active_plan(plan_handle).await?;

        let discount = match coupon_code.map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => Some(self.resolve_coupon(shop, &plan, code).await?),
            None => None,
        };

        let repo = SubscriptionRepository::new(self.pool);
        let prior = repo.list_for_shop(shop.id).await?;
        let trial_days = remaining_trial_days(plan.trial_days, &prior, Utc::now());

        let usage = match (plan.capped_amount, plan.interval) {
            (Some(capped_amount), BillingInterval::Every30Days) => Some(UsagePricing {
                capped_amount,
                terms: plan
                    .usage_terms
                    .clone()
                    .unwrap_or_else(|| format!("Usage charges for {}", plan.name)),
            }),
            (Some(_), BillingInterval::Annual) => {
                warn!(plan = %plan.handle, "Usage billing requires a 30-day interval; skipping usage line item");
                None
            }
            (None, _) => None,
        };

        let request = SubscriptionRequest {
            name: plan.name.clone(),
            return_url: self.return_url(shop, "/billing/confirm"),
            test: self.config.billing.test_mode,
            trial_days,
            price: plan.price,
            interval: plan.interval,
            discount: discount
                .as_ref()
                .map(|d| d.to_subscription_discount(plan.price)),
            usage,
        };

        let created = self.shopify.create_subscription(&request).await?;

        repo.create(&NewSubscription {
            shop_id: shop.id,
            plan_id: plan.id,
            shopify_id: created.subscription.id.clone(),
            usage_line_item_id: created.subscription.usage_line_item_id.clone(),
            name: plan.name.clone(),
            price: discount
                .as_ref()
                .map_or(plan.price, |d| d.apply(plan.price)),
            capped_amount: request.usage.as_ref().map(|u| u.capped_amount),
            trial_days,
            test: request.test,
            coupon_id: discount.as_ref().map(|d| d.coupon_id),
        })
        .await?;

        info!(
            plan = %plan.handle,
            subscription = %created.subscription.id,
            trial_days,
            coupon = discount.as_ref().map(|d| d.code.as_str()),
            "Subscription created, awaiting approval"
        );

        Ok(PendingCharge {
            confirmation_url: created.confirmation_url,
            discount,
        })
    }

    /// Finish a subscription after the merchant returns from the approval page.
    ///
    /// # Errors
    ///
    /// Returns `UnknownCharge` if the charge isn't one of this shop's, or an
    /// error if the billing API or database fails.
    #[instrument(skip(self, shop), fields(shop = %shop.domain))]
    pub async fn confirm(&self, shop: &Shop, charge_id: &str) -> Result<Subscription, BillingError> {
        let gid = to_gid("AppSubscription", charge_id);
        let repo = SubscriptionRepository::new(self.pool);

        let local = repo
            .get_by_shopify_id(&gid)
            .await?
            .filter(|s| s.shop_id == shop.id)
            .ok_or(BillingError::UnknownCharge)?;

        let remote = self
            .shopify
            .get_subscription(&gid)
            .await?
            .ok_or(BillingError::UnknownCharge)?;

        apply_remote_status(self.pool, local, remote.status, remote.current_period_end).await
    }

    /// Cancel the shop's current subscription.
    ///
    /// # Errors
    ///
    /// Returns `NoSubscription` when nothing is active, or an error if the
    /// billing API or database fails.
    #[instrument(skip(self, shop), fields(shop = %shop.domain))]
    pub async fn cancel(&self, shop: &Shop) -> Result<Subscription, BillingError> {
        let repo = SubscriptionRepository::new(self.pool);
        let mut current = repo
            .current_for_shop(shop.id)
            .await?
            .ok_or(BillingError::NoSubscription)?;

        let status = self
            .shopify
            .cancel_subscription(&current.shopify_id, false)
            .await?;
        if status != SubscriptionStatus::Cancelled {
            warn!(%status, "Billing API reported unexpected status after cancel");
        }

        repo.set_status(current.id, SubscriptionStatus::Cancelled, None)
            .await?;
        current.status = SubscriptionStatus::Cancelled;
        current.cancelled_at = Some(Utc::now());

        info!(subscription = %current.shopify_id, "Subscription cancelled");
        Ok(current)
    }

    /// Record a usage charge against the current subscription.
    ///
    /// A repeated `idempotency_key` returns the charge recorded the first
    /// time instead of charging again.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount`, `NoSubscription`, `UsageNotEnabled` or
    /// `UsageCapExceeded` for rejected charges, or an error if the billing API
    /// or database fails.
    #[instrument(skip(self, shop), fields(shop = %shop.domain))]
    pub async fn record_usage(
        &self,
        shop: &Shop,
        description: &str,
        amount: Money,
        idempotency_key: Option<&str>,
    ) -> Result<UsageCharge, BillingError> {
        let amount = check_charge_amount(amount)?;

        let repo = SubscriptionRepository::new(self.pool);
        let subscription = repo
            .current_for_shop(shop.id)
            .await?
            .ok_or(BillingError::NoSubscription)?;
        let (Some(line_item_id), Some(cap)) = (
            subscription.usage_line_item_id.as_deref(),
            subscription.capped_amount,
        ) else {
            return Err(BillingError::UsageNotEnabled);
        };
        if !subscription.accepts_usage() {
            return Err(BillingError::NoSubscription);
        }

        // Held until commit so concurrent charges cannot both pass the cap
        let mut usage = repo.lock_usage(subscription.id).await?;

        let key = idempotency_key.map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_owned);
        if let Some(existing) = usage.find_by_key(&key).await? {
            info!(key = %key, "Usage charge already recorded");
            return Ok(existing);
        }

        let since = usage_period_start(&subscription);
        let used = Money::new(usage.total_since(since).await?, cap.currency_code);
        check_usage_cap(used, amount, cap)?;

        let record = self
            .shopify
            .create_usage_record(line_item_id, amount, description, &key)
            .await?;

        let charge = usage
            .insert(&record.id, description, amount, &key)
            .await?;
        usage.commit().await?;

        info!(charge = %record.id, amount = %amount, "Usage charge recorded");
        Ok(charge)
    }

    /// Usage so far in the current period; `None` without usage billing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn usage_summary(&self, shop: &Shop) -> Result<Option<UsageSummary>, BillingError> {
        let repo = SubscriptionRepository::new(self.pool);
        let Some(subscription) = repo.current_for_shop(shop.id).await? else {
            return Ok(None);
        };
        let Some(cap) = subscription.capped_amount else {
            return Ok(None);
        };

        let since = usage_period_start(&subscription);
        let used = Money::new(
            repo.usage_total_since(subscription.id, since).await?,
            cap.currency_code,
        );
        Ok(Some(UsageSummary::new(used, cap, since)?))
    }

    /// Recent usage charges of the current subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn usage_charges(
        &self,
        shop: &Shop,
        limit: i64,
    ) -> Result<Vec<UsageCharge>, BillingError> {
        let repo = SubscriptionRepository::new(self.pool);
        match repo.current_for_shop(shop.id).await? {
            Some(subscription) => Ok(repo.list_usage(subscription.id, limit).await?),
            None => Ok(Vec::new()),
        }
    }

    /// The shop's one-time purchases, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn purchases(&self, shop: &Shop) -> Result<Vec<OneTimePurchase>, BillingError> {
        Ok(PurchaseRepository::new(self.pool)
            .list_for_shop(shop.id)
            .await?)
    }

    /// Start a one-time purchase, returning the approval URL.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount`, `AmountTooLarge` or a precision error for
    /// amounts [`check_charge_amount`] refuses, or an error if the billing API
    /// or database fails.
    #[instrument(skip(self, shop), fields(shop = %shop.domain))]
    pub async fn purchase_one_time(
        &self,
        shop: &Shop,
        name: &str,
        amount: Money,
    ) -> Result<PendingCharge, BillingError> {
        let amount = check_charge_amount(amount)?;

        let test = self.config.billing.test_mode;
        let created = self
            .shopify
            .create_one_time_purchase(
                name,
                amount,
                &self.return_url(shop, "/billing/purchases/confirm"),
                test,
            )
            .await?;

        PurchaseRepository::new(self.pool)
            .create(shop.id, &created.purchase.id, name, amount, test)
            .await?;

        info!(purchase = %created.purchase.id, amount = %amount, "One-time purchase created");
        Ok(PendingCharge {
            confirmation_url: created.confirmation_url,
            discount: None,
        })
    }

    /// Sync a one-time purchase after the merchant returns from approval.
    ///
    /// # Errors
    ///
    /// Returns `UnknownCharge` if the charge isn't one of this shop's, or an
    /// error if the billing API or database fails.
    #[instrument(skip(self, shop), fields(shop = %shop.domain))]
    pub async fn confirm_one_time(
        &self,
        shop: &Shop,
        charge_id: &str,
    ) -> Result<OneTimePurchase, BillingError> {
        let gid = to_gid("AppPurchaseOneTime", charge_id);
        let repo = PurchaseRepository::new(self.pool);

        let mut local = repo
            .get_by_shopify_id(shop.id, &gid)
            .await?
            .ok_or(BillingError::UnknownCharge)?;

        let remote = self
            .shopify
            .get_purchase(&gid)
            .await?
            .ok_or(BillingError::UnknownCharge)?;

        if remote.status != local.status {
            repo.set_status(local.id, remote.status).await?;
            local.status = remote.status;
        }
        if local.status == PurchaseStatus::Active {
            info!(purchase = %gid, "One-time purchase approved");
        }
        Ok(local)
    }
}

/// Apply a status reported by Shopify to a local subscription.
///
/// Activation stamps the period, redeems the subscription's coupon and
/// cancels the shop's other subscriptions.
async fn apply_remote_status(
    pool: &PgPool,
    local: Subscription,
    status: SubscriptionStatus,
    current_period_end: Option<DateTime<Utc>>,
) -> Result<Subscription, BillingError> {
    let repo = SubscriptionRepository::new(pool);

    match status {
        SubscriptionStatus::Active => {
            let activated = repo.activate(local.id, current_period_end).await?;
            if let Some(coupon_id) = activated.coupon_id {
                match CouponRepository::new(pool)
                    .redeem(coupon_id, activated.shop_id, activated.id)
                    .await
                {
                    Ok(_) => {}
                    Err(RepositoryError::Conflict(reason)) => {
                        warn!(coupon = %coupon_id, %reason, "Coupon redemption not recorded");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            let replaced = repo.cancel_others(activated.shop_id, activated.id).await?;
            info!(subscription = %activated.shopify_id, replaced, "Subscription active");
            Ok(activated)
        }
        SubscriptionStatus::Pending => Ok(local),
        other => {
            repo.set_status(local.id, other, current_period_end).await?;
            info!(subscription = %local.shopify_id, status = %other, "Subscription status updated");
            Ok(Subscription {
                status: other,
                ..local
            })
        }
    }
}

/// Apply an `app_subscriptions/update` webhook to the local mirror.
///
/// Returns `None` for subscriptions this app never recorded.
///
/// # Errors
///
/// Returns `UnknownCharge` when the subscription belongs to another shop, or
/// an error if the database fails.
#[instrument(skip(pool, shop, payload), fields(shop = %shop.domain))]
pub async fn sync_from_webhook(
    pool: &PgPool,
    shop: &Shop,
    payload: &SubscriptionWebhook,
) -> Result<Option<Subscription>, BillingError> {
    let body = &payload.app_subscription;
    let Some(local) = SubscriptionRepository::new(pool)
        .get_by_shopify_id(&body.admin_graphql_api_id)
        .await?
    else {
        warn!(subscription = %body.admin_graphql_api_id, "Webhook for unknown subscription");
        return Ok(None);
    };
    if local.shop_id != shop.id {
        return Err(BillingError::UnknownCharge);
    }

    let status = SubscriptionStatus::from_graphql(&body.status.to_ascii_uppercase());
    if status == local.status {
        return Ok(Some(local));
    }
    apply_remote_status(pool, local, status, None).await.map(Some)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use storekeep_core::{CurrencyCode, PlanId, ShopId, SubscriptionId};

    use super::*;

    fn usd(amount: &str) -> Money {
        Money::parse(amount, "USD").unwrap()
    }

    fn subscription(
        now: DateTime<Utc>,
        trial_days: i32,
        activated_days_ago: Option<i64>,
    ) -> Subscription {
        Subscription {
            id: SubscriptionId::new(1),
            shop_id: ShopId::new(1),
            plan_id: PlanId::new(1),
            shopify_id: "gid://shopify/AppSubscription/1".to_string(),
            usage_line_item_id: Some("gid://shopify/AppSubscriptionLineItem/1".to_string()),
            name: "Growth".to_string(),
            status: SubscriptionStatus::Active,
            price: usd("29.00"),
            capped_amount: Some(usd("100.00")),
            trial_days,
            test: true,
            coupon_id: None,
            current_period_end: None,
            activated_at: activated_days_ago.map(|d| now - Duration::days(d)),
            cancelled_at: None,
            created_at: now - Duration::days(60),
            updated_at: now,
        }
    }

    #[test]
    fn test_remaining_trial_subtracts_prior_use() {
        let now = Utc::now();
        let prior = vec![subscription(now, 14, Some(3)), subscription(now, 14, Some(2))];
        assert_eq!(remaining_trial_days(14, &prior, now), 9);
    }

    #[test]
    fn test_remaining_trial_floors_at_zero() {
        let now = Utc::now();
        let prior = vec![subscription(now, 14, Some(40))];
        assert_eq!(remaining_trial_days(7, &prior, now), 0);
    }

    #[test]
    fn test_unactivated_subscriptions_use_no_trial() {
        let now = Utc::now();
        let prior = vec![subscription(now, 14, None)];
        assert_eq!(remaining_trial_days(14, &prior, now), 14);
    }

    #[test]
    fn test_usage_period_start() {
        let now = Utc::now();
        let mut s = subscription(now, 0, Some(10));
        assert_eq!(usage_period_start(&s), s.activated_at.unwrap());

        let end = now + Duration::days(5);
        s.current_period_end = Some(end);
        assert_eq!(usage_period_start(&s), end - Duration::days(30));

        s.current_period_end = None;
        s.activated_at = None;
        assert_eq!(usage_period_start(&s), s.created_at);
    }

    #[test]
    fn test_usage_cap() {
        assert!(check_usage_cap(usd("90.00"), usd("10.00"), usd("100.00")).is_ok());

        let err = check_usage_cap(usd("90.00"), usd("10.01"), usd("100.00")).unwrap_err();
        assert!(err.is_client_error());
        match err {
            BillingError::UsageCapExceeded { remaining } => {
                assert_eq!(remaining, usd("10.00"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_usage_cap_overflow_counts_as_exceeded() {
        let huge = usd("79228162514264337593543950335");
        assert!(matches!(
            check_usage_cap(usd("1.00"), huge, usd("100.00")),
            Err(BillingError::UsageCapExceeded { .. })
        ));
    }

    #[test]
    fn test_charge_amount_limits() {
        assert_eq!(check_charge_amount(usd("12.50")).unwrap(), usd("12.50"));
        assert_eq!(check_charge_amount(usd("12.500")).unwrap(), usd("12.500"));
        assert!(matches!(
            check_charge_amount(usd("0")),
            Err(BillingError::InvalidAmount)
        ));
        assert!(matches!(
            check_charge_amount(usd("1000000.01")),
            Err(BillingError::AmountTooLarge)
        ));

        let err = check_charge_amount(usd("0.001")).unwrap_err();
        assert!(matches!(
            err,
            BillingError::Money(MoneyError::TooPrecise(CurrencyCode::USD, 2))
        ));
        assert!(err.is_client_error());

        let yen = Money::parse("1.5", "JPY").unwrap();
        assert!(check_charge_amount(yen).is_err());
    }

    #[test]
    fn test_usage_cap_currency_mismatch() {
        let cad = Money::parse("1.00", "CAD").unwrap();
        assert!(matches!(
            check_usage_cap(usd("0"), cad, usd("100.00")),
            Err(BillingError::Money(_))
        ));
    }

    #[test]
    fn test_usage_summary() {
        let summary = UsageSummary::new(usd("25.00"), usd("40.00"), Utc::now()).unwrap();
        assert_eq!(summary.remaining, usd("15.00"));
        assert_eq!(summary.percent_used, 63);

        let over = UsageSummary::new(usd("50.00"), usd("40.00"), Utc::now()).unwrap();
        assert_eq!(over.remaining, Money::zero(CurrencyCode::USD));
        assert_eq!(over.percent_used, 100);
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(
            BillingError::Coupon(CouponRejection::Expired)
                .user_message()
                .as_deref(),
            Some("That promo code has expired.")
        );
        assert!(
            BillingError::Repository(RepositoryError::NotFound)
                .user_message()
                .is_none()
        );
        let cap = BillingError::UsageCapExceeded {
            remaining: usd("2.50"),
        };
        assert_eq!(
            cap.to_string(),
            "This charge would exceed the usage cap; $2.50 USD remaining this period."
        );
    }

    #[test]
    fn test_webhook_payload() {
        let payload: SubscriptionWebhook = serde_json::from_str(
            r#"{"app_subscription":{"admin_graphql_api_id":"gid://shopify/AppSubscription/9",
                "name":"Growth","status":"CANCELLED",
                "admin_graphql_api_shop_id":"gid://shopify/Shop/1",
                "created_at":"2025-01-01T00:00:00-05:00"}}"#,
        )
        .unwrap();
        assert_eq!(
            SubscriptionStatus::from_graphql(&payload.app_subscription.status),
            SubscriptionStatus::Cancelled
        );
    }
}
