//! Billing route handlers: plans, subscription, usage and one-time purchases.
//!
//! Charges are approved on Shopify's confirmation page, which can't be
//! framed. Handlers that create a charge answer with a page that opens the
//! confirmation URL in the top window; Shopify then returns the merchant to
//! the `confirm` routes inside the admin.

use std::time::Duration;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form, Router,
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use storekeep_core::{Money, PurchaseStatus, SubscriptionStatus};
use tracing::instrument;

use super::auth::ExitIframeTemplate;
use super::{NoticeQuery, PageContext, format_date, format_datetime, render};
use crate::error::AppError;
use crate::filters;
use crate::middleware::ShopSession;
use crate::models::{OneTimePurchase, Plan, Subscription, UsageCharge};
use crate::queue::EmailJob;
use crate::services::{
    BillingError, BillingService, EmailMessage, UsageSummary, check_charge_amount,
};
use crate::state::AppState;

/// Usage level that triggers the alert email.
const USAGE_ALERT_PERCENT: u8 = 80;

/// Usage charges shown on the usage page.
const USAGE_PAGE_LIMIT: i64 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/billing", get(index))
        .route("/billing/subscribe", post(subscribe))
        .route("/billing/confirm", get(confirm))
        .route("/billing/cancel", post(cancel))
        .route("/billing/coupon", post(preview_coupon))
        .route("/billing/usage", get(usage).post(record_usage))
        .route("/billing/purchases", get(purchases).post(purchase))
        .route("/billing/purchases/confirm", get(confirm_purchase))
}

// =============================================================================
// Views
// =============================================================================

/// Plan card view for templates.
#[derive(Debug, Clone)]
pub struct PlanView {
    pub handle: String,
    pub name: String,
    pub price: String,
    pub interval: &'static str,
    pub trial_days: i32,
    pub capped_amount: Option<String>,
    pub usage_terms: Option<String>,
    pub features: Vec<String>,
    pub current: bool,
}

impl PlanView {
    fn new(plan: &Plan, current: Option<&Subscription>) -> Self {
        Self {
            handle: plan.handle.clone(),
            name: plan.name.clone(),
            price: plan.price.display(),
            interval: plan.interval.label(),
            trial_days: plan.trial_days,
            capped_amount: plan
                .capped_amount
                .filter(|_| plan.has_usage_billing())
                .map(|m| m.display()),
            usage_terms: plan.usage_terms.clone(),
            features: plan.features.clone(),
            current: current.is_some_and(|s| s.plan_id == plan.id && s.status.is_billable()),
        }
    }
}

/// Current subscription view for templates.
#[derive(Debug, Clone)]
pub struct SubscriptionView {
    pub name: String,
    pub status: String,
    pub status_class: &'static str,
    pub price: String,
    pub trial_days: i32,
    pub test: bool,
    pub renews_on: Option<String>,
    pub activated_on: Option<String>,
    pub usage_enabled: bool,
    pub cancellable: bool,
}

impl From<&Subscription> for SubscriptionView {
    fn from(s: &Subscription) -> Self {
        let status_class = match s.status {
            SubscriptionStatus::Active => "badge-success",
            SubscriptionStatus::Pending => "badge-attention",
            SubscriptionStatus::Frozen => "badge-warning",
            SubscriptionStatus::Declined
            | SubscriptionStatus::Expired
            | SubscriptionStatus::Cancelled => "badge-neutral",
        };
        Self {
            name: s.name.clone(),
            status: s.status.to_string(),
            status_class,
            price: s.price.display(),
            trial_days: s.trial_days,
            test: s.test,
            renews_on: s.current_period_end.map(format_date),
            activated_on: s.activated_at.map(format_date),
            usage_enabled: s.accepts_usage(),
            cancellable: !s.status.is_terminal(),
        }
    }
}

/// Usage meter view for templates.
#[derive(Debug, Clone)]
pub struct UsageView {
    pub used: String,
    pub cap: String,
    pub remaining: String,
    pub percent_used: u8,
    pub period_start: String,
    pub near_cap: bool,
}

impl From<&UsageSummary> for UsageView {
    fn from(u: &UsageSummary) -> Self {
        Self {
            used: u.used.display(),
            cap: u.cap.display(),
            remaining: u.remaining.display(),
            percent_used: u.percent_used,
            period_start: format_date(u.period_start),
            near_cap: u.percent_used >= USAGE_ALERT_PERCENT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UsageChargeView {
    pub description: String,
    pub price: String,
    pub created_at: String,
}

impl From<&UsageCharge> for UsageChargeView {
    fn from(c: &UsageCharge) -> Self {
        Self {
            description: c.description.clone(),
            price: c.price.display(),
            created_at: format_datetime(c.created_at),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PurchaseView {
    pub name: String,
    pub price: String,
    pub status: String,
    pub status_class: &'static str,
    pub test: bool,
    pub created_at: String,
}

impl From<&OneTimePurchase> for PurchaseView {
    fn from(p: &OneTimePurchase) -> Self {
        Self {
            name: p.name.clone(),
            price: p.price.display(),
            status: p.status.to_string(),
            status_class: match p.status {
                PurchaseStatus::Active => "badge-success",
                PurchaseStatus::Pending => "badge-attention",
                PurchaseStatus::Declined | PurchaseStatus::Expired => "badge-neutral",
            },
            test: p.test,
            created_at: format_datetime(p.created_at),
        }
    }
}

// =============================================================================
// Templates
// =============================================================================

/// Billing overview page template.
#[derive(Template, WebTemplate)]
#[template(path = "billing/index.html")]
pub struct BillingIndexTemplate {
    pub page: PageContext,
    pub plans: Vec<PlanView>,
    pub subscription: Option<SubscriptionView>,
    pub usage: Option<UsageView>,
}

/// Promo code preview fragment (HTMX).
#[derive(Template)]
#[template(path = "billing/_coupon.html")]
pub struct CouponPreviewTemplate {
    pub code: String,
    pub plan_name: String,
    pub original_price: String,
    pub discounted_price: String,
    pub description: String,
    pub error: Option<String>,
}

/// Usage charges page template.
#[derive(Template, WebTemplate)]
#[template(path = "billing/usage.html")]
pub struct UsageTemplate {
    pub page: PageContext,
    pub usage: Option<UsageView>,
    pub charges: Vec<UsageChargeView>,
    pub currency: &'static str,
}

/// One-time purchases page template.
#[derive(Template, WebTemplate)]
#[template(path = "billing/purchases.html")]
pub struct PurchasesTemplate {
    pub page: PageContext,
    pub purchases: Vec<PurchaseView>,
    pub currency: &'static str,
}

// =============================================================================
// Form Inputs
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SubscribeInput {
    pub plan: String,
    #[serde(default)]
    pub coupon: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChargeQuery {
    pub charge_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UsageInput {
    pub description: String,
    pub amount: String,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseInput {
    pub name: String,
    pub amount: String,
}

// =============================================================================
// Helpers
// =============================================================================

fn billing<'a>(state: &'a AppState, session: &'a ShopSession) -> BillingService<'a> {
    BillingService::new(state.pool(), &session.client, state.config())
}

async fn index_page(
    state: &AppState,
    session: &ShopSession,
    page: PageContext,
) -> Result<BillingIndexTemplate, AppError> {
    let service = billing(state, session);
    let subscription = service.current_subscription(&session.shop).await?;
    let plans = service
        .plans()
        .await?
        .iter()
        .map(|plan| PlanView::new(plan, subscription.as_ref()))
        .collect();
    let usage = service.usage_summary(&session.shop).await?;

    Ok(BillingIndexTemplate {
        page,
        plans,
        subscription: subscription.as_ref().map(SubscriptionView::from),
        usage: usage.as_ref().map(UsageView::from),
    })
}

/// Re-render the overview with a merchant-facing error, or fail for internal errors.
async fn index_with_error(
    state: &AppState,
    session: &ShopSession,
    error: BillingError,
) -> Result<Response, AppError> {
    let Some(message) = error.user_message() else {
        return Err(error.into());
    };
    let page = PageContext::new(state, session, "/billing").with_error(message);
    Ok(index_page(state, session, page).await?.into_response())
}

/// Parse a form amount in the billing currency, with the banner text on failure.
fn parse_amount(currency: &str, raw: &str) -> Result<Money, String> {
    let amount = Money::parse(raw.trim(), currency)
        .map_err(|_| "Enter an amount like 12.50.".to_string())?;
    check_charge_amount(amount).map_err(|e| e.to_string())
}

/// Whether a charge moved usage across the alert threshold.
const fn crossed_alert_threshold(before: u8, after: u8) -> bool {
    before < USAGE_ALERT_PERCENT && after >= USAGE_ALERT_PERCENT
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /billing - Plans, current subscription and usage meter.
#[instrument(skip(session, state), fields(shop = %session.shop.domain))]
async fn index(
    session: ShopSession,
    State(state): State<AppState>,
    Query(notice): Query<NoticeQuery>,
) -> Result<BillingIndexTemplate, AppError> {
    let page = PageContext::new(&state, &session, "/billing").with_notice(&notice);
    index_page(&state, &session, page).await
}

/// POST /billing/subscribe - Create a subscription and send the merchant to approve it.
#[instrument(skip(session, state), fields(shop = %session.shop.domain))]
async fn subscribe(
    session: ShopSession,
    State(state): State<AppState>,
    Form(input): Form<SubscribeInput>,
) -> Result<Response, AppError> {
    match billing(&state, &session)
        .subscribe(&session.shop, &input.plan, input.coupon.as_deref())
        .await
    {
        Ok(pending) => Ok(ExitIframeTemplate {
            api_key: state.shopify().api_key().to_string(),
            target: pending.confirmation_url,
        }
        .into_response()),
        Err(e) => {
            tracing::warn!(plan = %input.plan, error = %e, "Subscription not created");
            index_with_error(&state, &session, e).await
        }
    }
}

/// GET /billing/confirm - Return URL after the approval page.
#[instrument(skip(session, state), fields(shop = %session.shop.domain))]
async fn confirm(
    session: ShopSession,
    State(state): State<AppState>,
    Query(query): Query<ChargeQuery>,
) -> Result<Response, AppError> {
    let charge_id = query
        .charge_id
        .ok_or_else(|| AppError::BadRequest("Missing charge_id".to_string()))?;

    match billing(&state, &session)
        .confirm(&session.shop, &charge_id)
        .await
    {
        Ok(subscription) if subscription.status == SubscriptionStatus::Active => {
            Ok(session.redirect("/billing?success=subscribed").into_response())
        }
        Ok(_) => Ok(session
            .redirect("/billing?error=subscription_declined")
            .into_response()),
        Err(e) => index_with_error(&state, &session, e).await,
    }
}

/// POST /billing/cancel - Cancel the current subscription.
#[instrument(skip(session, state), fields(shop = %session.shop.domain))]
async fn cancel(session: ShopSession, State(state): State<AppState>) -> Result<Response, AppError> {
    match billing(&state, &session).cancel(&session.shop).await {
        Ok(_) => Ok(session.redirect("/billing?success=cancelled").into_response()),
        Err(e) => index_with_error(&state, &session, e).await,
    }
}

/// POST /billing/coupon - Preview a promo code against a plan (HTMX fragment).
#[instrument(skip(session, state), fields(shop = %session.shop.domain))]
async fn preview_coupon(
    session: ShopSession,
    State(state): State<AppState>,
    Form(input): Form<SubscribeInput>,
) -> Result<Response, AppError> {
    let code = input.coupon.unwrap_or_default();
    let mut fragment = CouponPreviewTemplate {
        code: code.trim().to_string(),
        plan_name: String::new(),
        original_price: String::new(),
        discounted_price: String::new(),
        description: String::new(),
        error: None,
    };

    if fragment.code.is_empty() {
        fragment.error = Some("Enter a promo code.".to_string());
        return Ok(render(&fragment));
    }

    match billing(&state, &session)
        .preview_coupon(&session.shop, &input.plan, &fragment.code)
        .await
    {
        Ok(preview) => {
            fragment.plan_name = preview.plan.name.clone();
            fragment.original_price = preview.plan.price.display();
            fragment.discounted_price = preview.discounted_price.display();
            fragment.description = preview.description;
        }
        Err(e) => match e.user_message() {
            Some(message) => fragment.error = Some(message),
            None => return Err(e.into()),
        },
    }

    Ok(render(&fragment))
}

async fn usage_page(
    state: &AppState,
    session: &ShopSession,
    page: PageContext,
) -> Result<UsageTemplate, AppError> {
    let service = billing(state, session);
    let usage = service.usage_summary(&session.shop).await?;
    let charges = service
        .usage_charges(&session.shop, USAGE_PAGE_LIMIT)
        .await?;

    Ok(UsageTemplate {
        page,
        usage: usage.as_ref().map(UsageView::from),
        charges: charges.iter().map(UsageChargeView::from).collect(),
        currency: state.config().billing.currency.as_str(),
    })
}

/// GET /billing/usage - Usage charges of the current period.
#[instrument(skip(session, state), fields(shop = %session.shop.domain))]
async fn usage(
    session: ShopSession,
    State(state): State<AppState>,
    Query(notice): Query<NoticeQuery>,
) -> Result<UsageTemplate, AppError> {
    let page = PageContext::new(&state, &session, "/billing/usage").with_notice(&notice);
    usage_page(&state, &session, page).await
}

/// POST /billing/usage - Record a usage charge.
#[instrument(skip(session, state, input), fields(shop = %session.shop.domain))]
async fn record_usage(
    session: ShopSession,
    State(state): State<AppState>,
    Form(input): Form<UsageInput>,
) -> Result<Response, AppError> {
    let amount = match parse_amount(state.config().billing.currency.as_str(), &input.amount) {
        Ok(amount) => amount,
        Err(message) => {
            let page = PageContext::new(&state, &session, "/billing/usage").with_error(message);
            return Ok(usage_page(&state, &session, page).await?.into_response());
        }
    };

    let service = billing(&state, &session);
    let before = service
        .usage_summary(&session.shop)
        .await?
        .map_or(0, |u| u.percent_used);

    let idempotency_key = input
        .idempotency_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty());

    if let Err(e) = service
        .record_usage(&session.shop, input.description.trim(), amount, idempotency_key)
        .await
    {
        let Some(message) = e.user_message() else {
            return Err(e.into());
        };
        let page = PageContext::new(&state, &session, "/billing/usage").with_error(message);
        return Ok(usage_page(&state, &session, page).await?.into_response());
    }

    if let Some(after) = service.usage_summary(&session.shop).await? {
        if crossed_alert_threshold(before, after.percent_used) {
            queue_usage_alert(&state, &session, &after).await;
        }
    }

    Ok(session
        .redirect("/billing/usage?success=usage_recorded")
        .into_response())
}

async fn queue_usage_alert(state: &AppState, session: &ShopSession, usage: &UsageSummary) {
    let Some(email) = &session.shop.email else {
        return;
    };
    let job = EmailJob {
        to: email.clone(),
        message: EmailMessage::UsageAlert {
            shop_name: session.shop.display_name().to_string(),
            percent_used: usage.percent_used,
            used: usage.used.display(),
            cap: usage.cap.display(),
            admin_url: format!(
                "{}/billing/usage",
                session.shop.domain.admin_app_url(state.shopify().api_key())
            ),
        },
        attachment: None,
    };
    if let Err(e) = state
        .queue()
        .enqueue(Some(session.shop.id), &job, Duration::ZERO)
        .await
    {
        tracing::error!(error = %e, "Failed to queue usage alert");
    }
}

async fn purchases_page(
    state: &AppState,
    session: &ShopSession,
    page: PageContext,
) -> Result<PurchasesTemplate, AppError> {
    let purchases = billing(state, session).purchases(&session.shop).await?;
    Ok(PurchasesTemplate {
        page,
        purchases: purchases.iter().map(PurchaseView::from).collect(),
        currency: state.config().billing.currency.as_str(),
    })
}

/// GET /billing/purchases - One-time purchases.
#[instrument(skip(session, state), fields(shop = %session.shop.domain))]
async fn purchases(
    session: ShopSession,
    State(state): State<AppState>,
    Query(notice): Query<NoticeQuery>,
) -> Result<PurchasesTemplate, AppError> {
    let page = PageContext::new(&state, &session, "/billing/purchases").with_notice(&notice);
    purchases_page(&state, &session, page).await
}

/// POST /billing/purchases - Start a one-time purchase.
#[instrument(skip(session, state, input), fields(shop = %session.shop.domain))]
async fn purchase(
    session: ShopSession,
    State(state): State<AppState>,
    Form(input): Form<PurchaseInput>,
) -> Result<Response, AppError> {
    let name = input.name.trim();
    let result = match parse_amount(state.config().billing.currency.as_str(), &input.amount) {
        Ok(_) if name.is_empty() => Err("Give the purchase a name.".to_string()),
        Ok(amount) => match billing(&state, &session)
            .purchase_one_time(&session.shop, name, amount)
            .await
        {
            Ok(pending) => Ok(pending),
            Err(e) => Err(e.user_message().ok_or(e)?),
        },
        Err(message) => Err(message),
    };

    match result {
        Ok(pending) => Ok(ExitIframeTemplate {
            api_key: state.shopify().api_key().to_string(),
            target: pending.confirmation_url,
        }
        .into_response()),
        Err(message) => {
            let page = PageContext::new(&state, &session, "/billing/purchases").with_error(message);
            Ok(purchases_page(&state, &session, page).await?.into_response())
        }
    }
}

/// GET /billing/purchases/confirm - Return URL after approving a purchase.
#[instrument(skip(session, state), fields(shop = %session.shop.domain))]
async fn confirm_purchase(
    session: ShopSession,
    State(state): State<AppState>,
    Query(query): Query<ChargeQuery>,
) -> Result<Response, AppError> {
    let charge_id = query
        .charge_id
        .ok_or_else(|| AppError::BadRequest("Missing charge_id".to_string()))?;

    let purchase = billing(&state, &session)
        .confirm_one_time(&session.shop, &charge_id)
        .await?;

    let target = if purchase.status == PurchaseStatus::Active {
        "/billing/purchases?success=purchased"
    } else {
        "/billing/purchases?error=purchase_declined"
    };
    Ok(session.redirect(target).into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use storekeep_core::{BillingInterval, CurrencyCode, PlanId, ShopId, SubscriptionId};

    use super::*;

    fn subscription(status: SubscriptionStatus) -> Subscription {
        Subscription {
            id: SubscriptionId::new(1),
            shop_id: ShopId::new(1),
            plan_id: PlanId::new(2),
            shopify_id: "gid://shopify/AppSubscription/1".to_string(),
            usage_line_item_id: None,
            name: "Growth".to_string(),
            status,
            price: Money::parse("29.00", "USD").unwrap(),
            capped_amount: None,
            trial_days: 7,
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
    fn test_alert_threshold_crossing() {
        assert!(crossed_alert_threshold(79, 80));
        assert!(crossed_alert_threshold(10, 100));
        assert!(!crossed_alert_threshold(80, 95));
        assert!(!crossed_alert_threshold(50, 79));
    }

    #[test]
    fn test_subscription_view() {
        let view = SubscriptionView::from(&subscription(SubscriptionStatus::Active));
        assert_eq!(view.status, "active");
        assert_eq!(view.status_class, "badge-success");
        assert!(view.cancellable);
        assert!(!view.usage_enabled);

        let view = SubscriptionView::from(&subscription(SubscriptionStatus::Cancelled));
        assert!(!view.cancellable);
    }

    #[test]
    fn test_usage_view_flags_near_cap() {
        let used = Money::parse("85.00", "USD").unwrap();
        let cap = Money::parse("100.00", "USD").unwrap();
        let summary = UsageSummary::new(used, cap, Utc::now()).unwrap();
        let view = UsageView::from(&summary);
        assert_eq!(view.percent_used, 85);
        assert!(view.near_cap);
        assert_eq!(summary.remaining.currency_code, CurrencyCode::USD);
    }

    #[test]
    fn test_plan_view_hides_cap_on_annual_plans() {
        let mut plan = Plan {
            id: PlanId::new(2),
            handle: "growth".to_string(),
            name: "Growth".to_string(),
            price: Money::parse("29.00", "USD").unwrap(),
            interval: BillingInterval::Every30Days,
            trial_days: 7,
            capped_amount: Some(Money::parse("100.00", "USD").unwrap()),
            usage_terms: None,
            features: vec![],
            position: 1,
            active: true,
        };
        let current = subscription(SubscriptionStatus::Active);

        let view = PlanView::new(&plan, Some(&current));
        assert!(view.current);
        assert!(view.capped_amount.is_some());

        plan.interval = BillingInterval::Annual;
        let view = PlanView::new(&plan, None);
        assert!(!view.current);
        assert_eq!(view.capped_amount, None);
    }

    #[test]
    fn test_parse_amount_rejects_unbillable_amounts() {
        assert_eq!(
            parse_amount("USD", " 12.50 ").unwrap(),
            Money::parse("12.50", "USD").unwrap()
        );
        assert_eq!(
            parse_amount("USD", "twelve").unwrap_err(),
            "Enter an amount like 12.50."
        );
        assert_eq!(
            parse_amount("USD", "-1").unwrap_err(),
            "Amount must be greater than zero."
        );
        assert_eq!(
            parse_amount("USD", "0.001").unwrap_err(),
            "USD takes at most 2 decimal places"
        );
        assert_eq!(
            parse_amount("USD", "79228162514264337593543950335").unwrap_err(),
            "Amount can be at most 1000000."
        );
    }
}
