//! Discount code route handlers.
//!
//! Only basic (amount off) code discounts can be created and edited here;
//! other discount classes are listed and can be activated, deactivated or
//! deleted.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use super::{NoticeQuery, PageContext, format_datetime, render};
use crate::error::AppError;
use crate::filters;
use crate::middleware::ShopSession;
use crate::shopify::{
    AdminShopifyError, DiscountCode, DiscountInput, DiscountStatus, DiscountValue,
    DiscountValueInput, gid_tail, to_gid,
};
use crate::state::AppState;

const DISCOUNTS_PER_PAGE: i64 = 25;
const DATETIME_INPUT_FORMAT: &str = "%Y-%m-%dT%H:%M";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/discounts", get(index).post(create))
        .route("/discounts/new", get(new_discount))
        .route("/discounts/{id}", post(update))
        .route("/discounts/{id}/edit", get(edit))
        .route("/discounts/{id}/activate", post(activate))
        .route("/discounts/{id}/deactivate", post(deactivate))
        .route("/discounts/{id}/delete", post(delete))
}

fn discount_gid(id: &str) -> String {
    to_gid("DiscountCodeNode", id)
}

/// Pagination query parameters.
#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    pub cursor: Option<String>,
    pub query: Option<String>,
}

/// Discount view for templates.
#[derive(Debug, Clone)]
pub struct DiscountView {
    pub id: String,
    pub title: String,
    pub code: String,
    pub status: String,
    pub status_class: &'static str,
    pub active: bool,
    pub kind: String,
    pub value: String,
    pub usage: String,
    pub starts_at: Option<String>,
    pub ends_at: Option<String>,
    pub editable: bool,
}

impl From<&DiscountCode> for DiscountView {
    fn from(dc: &DiscountCode) -> Self {
        let status_class = match dc.status {
            DiscountStatus::Active => "badge-success",
            DiscountStatus::Expired => "badge-neutral",
            DiscountStatus::Scheduled => "badge-info",
        };

        let value = match &dc.value {
            Some(DiscountValue::Percentage { percentage }) => {
                format!("{}%", (percentage * 100.0).round())
            }
            Some(DiscountValue::FixedAmount { amount }) => format!("{} off", amount.display()),
            None => "-".to_string(),
        };

        let usage = dc.usage_limit.map_or_else(
            || format!("{} uses", dc.usage_count),
            |limit| format!("{}/{} uses", dc.usage_count, limit),
        );

        Self {
            id: gid_tail(&dc.id).to_string(),
            title: dc.title.clone(),
            code: dc.code.clone(),
            status: dc.status.to_string(),
            status_class,
            active: dc.status == DiscountStatus::Active,
            kind: dc.kind.clone(),
            value,
            usage,
            starts_at: dc.starts_at.map(format_datetime),
            ends_at: dc.ends_at.map(format_datetime),
            editable: dc.is_basic(),
        }
    }
}

/// Values of the create/edit form, kept as typed so errors re-render them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscountForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub code: String,
    #[serde(default = "default_discount_type")]
    pub discount_type: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub starts_at: String,
    #[serde(default)]
    pub ends_at: String,
    #[serde(default)]
    pub usage_limit: String,
    pub once_per_customer: Option<String>,
}

fn default_discount_type() -> String {
    "percentage".to_string()
}

impl DiscountForm {
    fn blank(now: DateTime<Utc>) -> Self {
        Self {
            discount_type: default_discount_type(),
            starts_at: now.format(DATETIME_INPUT_FORMAT).to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_percentage(&self) -> bool {
        self.discount_type != "fixed"
    }

    #[must_use]
    pub const fn once_per_customer_checked(&self) -> bool {
        self.once_per_customer.is_some()
    }

    /// Validate the form into mutation input. `now` fills an empty start.
    ///
    /// # Errors
    ///
    /// Returns a message for the first invalid field.
    pub fn to_input(&self, now: DateTime<Utc>) -> Result<DiscountInput, String> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err("Title is required.".to_string());
        }
        let code = self.code.trim();
        if code.is_empty() || code.chars().any(char::is_whitespace) {
            return Err("Code is required and can't contain spaces.".to_string());
        }

        let amount: Decimal = self
            .value
            .trim()
            .parse()
            .map_err(|_| "Value must be a number.".to_string())?;
        if amount <= Decimal::ZERO {
            return Err("Value must be greater than zero.".to_string());
        }
        let value = if self.is_percentage() {
            if amount > Decimal::ONE_HUNDRED {
                return Err("Percentage can't be more than 100.".to_string());
            }
            DiscountValueInput::Percentage(amount)
        } else {
            DiscountValueInput::FixedAmount(amount)
        };

        let starts_at = parse_datetime(&self.starts_at)?.unwrap_or(now);
        let ends_at = parse_datetime(&self.ends_at)?;
        if ends_at.is_some_and(|end| end <= starts_at) {
            return Err("End date must be after the start date.".to_string());
        }

        let usage_limit = match self.usage_limit.trim() {
            "" => None,
            raw => match raw.parse::<i64>() {
                Ok(n) if n > 0 => Some(n),
                _ => return Err("Usage limit must be a positive whole number.".to_string()),
            },
        };

        Ok(DiscountInput {
            title: title.to_string(),
            code: code.to_string(),
            value,
            starts_at,
            ends_at,
            usage_limit,
            once_per_customer: self.once_per_customer_checked(),
        })
    }
}

impl From<&DiscountCode> for DiscountForm {
    fn from(dc: &DiscountCode) -> Self {
        let (discount_type, value) = match &dc.value {
            Some(DiscountValue::Percentage { percentage }) => (
                "percentage",
                Decimal::try_from(percentage * 100.0)
                    .map(|d| d.round_dp(2).normalize().to_string())
                    .unwrap_or_default(),
            ),
            Some(DiscountValue::FixedAmount { amount }) => ("fixed", amount.amount.to_string()),
            None => ("percentage", String::new()),
        };
        Self {
            title: dc.title.clone(),
            code: dc.code.clone(),
            discount_type: discount_type.to_string(),
            value,
            starts_at: dc
                .starts_at
                .map(|at| at.format(DATETIME_INPUT_FORMAT).to_string())
                .unwrap_or_default(),
            ends_at: dc
                .ends_at
                .map(|at| at.format(DATETIME_INPUT_FORMAT).to_string())
                .unwrap_or_default(),
            usage_limit: dc.usage_limit.map(|n| n.to_string()).unwrap_or_default(),
            once_per_customer: None,
        }
    }
}

/// Accepts `datetime-local` values (taken as UTC) and RFC 3339.
fn parse_datetime(raw: &str) -> Result<Option<DateTime<Utc>>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(at.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(raw, DATETIME_INPUT_FORMAT)
        .map(|naive| Some(naive.and_utc()))
        .map_err(|_| format!("Invalid date: {raw}"))
}

/// Discounts list page template.
#[derive(Template, WebTemplate)]
#[template(path = "discounts/index.html")]
pub struct DiscountsIndexTemplate {
    pub page: PageContext,
    pub discounts: Vec<DiscountView>,
    pub next_href: Option<String>,
    pub search_query: Option<String>,
}

/// Link to the page after `cursor`, keeping the search.
pub fn next_page_href(base: &str, cursor: &str, search: Option<&str>) -> String {
    let mut href = format!("{base}?cursor={}", urlencoding::encode(cursor));
    if let Some(q) = search {
        href.push_str("&query=");
        href.push_str(&urlencoding::encode(q));
    }
    href
}

/// Create/edit form template.
#[derive(Template, WebTemplate)]
#[template(path = "discounts/form.html")]
pub struct DiscountFormTemplate {
    pub page: PageContext,
    /// Numeric ID when editing.
    pub discount_id: Option<String>,
    pub form: DiscountForm,
    pub currency: String,
}

impl DiscountFormTemplate {
    fn action(&self) -> String {
        self.discount_id
            .as_ref()
            .map_or_else(|| "/discounts".to_string(), |id| format!("/discounts/{id}"))
    }
}

/// A single table row, swapped in after activate/deactivate.
#[derive(Template)]
#[template(path = "discounts/_row.html")]
pub struct DiscountRowTemplate {
    pub discount: DiscountView,
}

/// GET /discounts - List discount codes.
#[instrument(skip(session, state), fields(shop = %session.shop.domain))]
async fn index(
    session: ShopSession,
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
    Query(notice): Query<NoticeQuery>,
) -> Result<DiscountsIndexTemplate, AppError> {
    let search = query.query.filter(|q| !q.trim().is_empty());
    let mut page = PageContext::new(&state, &session, "/discounts").with_notice(&notice);

    let (discounts, has_next_page, next_cursor) = match session
        .client
        .get_discounts(DISCOUNTS_PER_PAGE, query.cursor, search.clone())
        .await
    {
        Ok(conn) => (
            conn.discount_codes.iter().map(DiscountView::from).collect(),
            conn.page_info.has_next_page,
            conn.page_info.end_cursor,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to fetch discounts");
            page = page.with_error(AppError::from(e).public_message());
            (vec![], false, None)
        }
    };

    let next_href = next_cursor
        .filter(|_| has_next_page)
        .map(|cursor| next_page_href("/discounts", &cursor, search.as_deref()));

    Ok(DiscountsIndexTemplate {
        page,
        discounts,
        next_href,
        search_query: search,
    })
}

/// GET /discounts/new - Create form.
#[instrument(skip(session, state), fields(shop = %session.shop.domain))]
async fn new_discount(session: ShopSession, State(state): State<AppState>) -> DiscountFormTemplate {
    DiscountFormTemplate {
        page: PageContext::new(&state, &session, "/discounts"),
        discount_id: None,
        form: DiscountForm::blank(Utc::now()),
        currency: session.shop.currency_code.to_string(),
    }
}

/// Banner text for `userErrors`; any other failure propagates.
fn form_error(e: AdminShopifyError) -> Result<String, AppError> {
    let messages = e.user_messages();
    if messages.is_empty() {
        Err(e.into())
    } else {
        Ok(messages.join(" "))
    }
}

/// POST /discounts - Create a basic discount code.
#[instrument(skip(session, state, form), fields(shop = %session.shop.domain))]
async fn create(
    session: ShopSession,
    State(state): State<AppState>,
    Form(form): Form<DiscountForm>,
) -> Result<Response, AppError> {
    let result = match form.to_input(Utc::now()) {
        Ok(input) => session
            .client
            .create_discount(&input)
            .await
            .map_err(form_error),
        Err(message) => Err(Ok(message)),
    };

    match result {
        Ok(discount_id) => {
            tracing::info!(discount_id = %discount_id, "Discount created");
            Ok(session
                .redirect("/discounts?success=discount_created")
                .into_response())
        }
        Err(Ok(message)) => Ok(DiscountFormTemplate {
            page: PageContext::new(&state, &session, "/discounts").with_error(message),
            discount_id: None,
            form,
            currency: session.shop.currency_code.to_string(),
        }
        .into_response()),
        Err(Err(e)) => Err(e),
    }
}

/// GET /discounts/{id}/edit - Edit form.
#[instrument(skip(session, state), fields(shop = %session.shop.domain))]
async fn edit(
    session: ShopSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<DiscountFormTemplate, AppError> {
    let discount = session
        .client
        .get_discount(&discount_gid(&id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("discount {id}")))?;

    let mut page = PageContext::new(&state, &session, "/discounts");
    if !discount.is_basic() {
        page = page.with_error("Only amount-off code discounts can be edited here.");
    }

    Ok(DiscountFormTemplate {
        page,
        discount_id: Some(gid_tail(&discount.id).to_string()),
        form: DiscountForm::from(&discount),
        currency: session.shop.currency_code.to_string(),
    })
}

/// POST /discounts/{id} - Update a basic discount code.
#[instrument(skip(session, state, form), fields(shop = %session.shop.domain))]
async fn update(
    session: ShopSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Form(form): Form<DiscountForm>,
) -> Result<Response, AppError> {
    let discount_id = discount_gid(&id);
    let result = match form.to_input(Utc::now()) {
        Ok(input) => session
            .client
            .update_discount(&discount_id, &input)
            .await
            .map_err(form_error),
        Err(message) => Err(Ok(message)),
    };

    match result {
        Ok(_) => {
            tracing::info!(discount_id = %discount_id, "Discount updated");
            Ok(session
                .redirect("/discounts?success=discount_updated")
                .into_response())
        }
        Err(Ok(message)) => Ok(DiscountFormTemplate {
            page: PageContext::new(&state, &session, "/discounts").with_error(message),
            discount_id: Some(gid_tail(&discount_id).to_string()),
            form,
            currency: session.shop.currency_code.to_string(),
        }
        .into_response()),
        Err(Err(e)) => Err(e),
    }
}

/// Error response for an HTMX action; `app.js` shows the body as a toast.
fn fragment_error(e: AdminShopifyError) -> Response {
    let error = AppError::from(e);
    let status = error.status();
    if status.is_server_error() {
        tracing::error!(error = %error, "Discount action failed");
    }
    (status, error.public_message()).into_response()
}

async fn refreshed_row(session: &ShopSession, discount_id: &str, trigger: &'static str) -> Response {
    match session.client.get_discount(discount_id).await {
        Ok(Some(discount)) => {
            let row = render(&DiscountRowTemplate {
                discount: DiscountView::from(&discount),
            });
            ([("HX-Trigger", trigger)], row).into_response()
        }
        Ok(None) => (StatusCode::NOT_FOUND, "Discount not found").into_response(),
        Err(e) => fragment_error(e),
    }
}

/// POST /discounts/{id}/activate - Activate (HTMX).
#[instrument(skip(session), fields(shop = %session.shop.domain))]
async fn activate(session: ShopSession, Path(id): Path<String>) -> Response {
    let discount_id = discount_gid(&id);
    match session.client.activate_discount(&discount_id).await {
        Ok(()) => {
            tracing::info!(discount_id = %discount_id, "Discount activated");
            refreshed_row(&session, &discount_id, "discount-activated").await
        }
        Err(e) => fragment_error(e),
    }
}

/// POST /discounts/{id}/deactivate - Deactivate (HTMX).
#[instrument(skip(session), fields(shop = %session.shop.domain))]
async fn deactivate(session: ShopSession, Path(id): Path<String>) -> Response {
    let discount_id = discount_gid(&id);
    match session.client.deactivate_discount(&discount_id).await {
        Ok(()) => {
            tracing::info!(discount_id = %discount_id, "Discount deactivated");
            refreshed_row(&session, &discount_id, "discount-deactivated").await
        }
        Err(e) => fragment_error(e),
    }
}

/// POST /discounts/{id}/delete - Delete (HTMX, the row is removed).
#[instrument(skip(session), fields(shop = %session.shop.domain))]
async fn delete(session: ShopSession, Path(id): Path<String>) -> Response {
    let discount_id = discount_gid(&id);
    match session.client.delete_discount(&discount_id).await {
        Ok(()) => {
            tracing::info!(discount_id = %discount_id, "Discount deleted");
            ([("HX-Trigger", "discount-deleted")], "").into_response()
        }
        Err(e) => fragment_error(e),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
    }

    fn form() -> DiscountForm {
        DiscountForm {
            title: "Spring sale".to_string(),
            code: "SPRING20".to_string(),
            discount_type: "percentage".to_string(),
            value: "20".to_string(),
            ..DiscountForm::default()
        }
    }

    #[test]
    fn test_percentage_form() {
        let input = form().to_input(now()).unwrap();
        assert_eq!(input.value, DiscountValueInput::Percentage(Decimal::new(20, 0)));
        assert_eq!(input.starts_at, now());
        assert_eq!(input.ends_at, None);
        assert_eq!(input.usage_limit, None);
        assert!(!input.once_per_customer);
    }

    #[test]
    fn test_fixed_form_with_dates_and_limit() {
        let f = DiscountForm {
            discount_type: "fixed".to_string(),
            value: "5.50".to_string(),
            starts_at: "2026-06-01T09:30".to_string(),
            ends_at: "2026-06-30T23:59".to_string(),
            usage_limit: "100".to_string(),
            once_per_customer: Some("on".to_string()),
            ..form()
        };
        let input = f.to_input(now()).unwrap();
        assert_eq!(input.value, DiscountValueInput::FixedAmount(Decimal::new(550, 2)));
        assert_eq!(
            input.starts_at,
            Utc.with_ymd_and_hms(2026, 6, 1, 9, 30, 0).unwrap()
        );
        assert!(input.ends_at.is_some());
        assert_eq!(input.usage_limit, Some(100));
        assert!(input.once_per_customer);
    }

    #[test]
    fn test_form_rejections() {
        let too_much = DiscountForm {
            value: "150".to_string(),
            ..form()
        };
        assert!(too_much.to_input(now()).is_err());

        let spaced = DiscountForm {
            code: "SPRING 20".to_string(),
            ..form()
        };
        assert!(spaced.to_input(now()).is_err());

        let backwards = DiscountForm {
            starts_at: "2026-06-10T00:00".to_string(),
            ends_at: "2026-06-01T00:00".to_string(),
            ..form()
        };
        assert!(backwards.to_input(now()).is_err());

        let bad_limit = DiscountForm {
            usage_limit: "0".to_string(),
            ..form()
        };
        assert!(bad_limit.to_input(now()).is_err());
    }

    #[test]
    fn test_view_from_discount() {
        let dc = DiscountCode {
            id: "gid://shopify/DiscountCodeNode/42".to_string(),
            title: "Spring".to_string(),
            code: "SPRING".to_string(),
            status: DiscountStatus::Active,
            kind: "Amount off".to_string(),
            value: Some(DiscountValue::Percentage { percentage: 0.2 }),
            starts_at: None,
            ends_at: None,
            usage_limit: Some(10),
            usage_count: 3,
        };
        let view = DiscountView::from(&dc);
        assert_eq!(view.id, "42");
        assert_eq!(view.value, "20%");
        assert_eq!(view.usage, "3/10 uses");
        assert!(view.active && view.editable);

        let form = DiscountForm::from(&dc);
        assert_eq!(form.value, "20");
        assert!(form.is_percentage());
    }

    #[test]
    fn test_next_page_href() {
        assert_eq!(
            next_page_href("/discounts", "abc=", Some("spring sale")),
            "/discounts?cursor=abc%3D&query=spring%20sale"
        );
        assert_eq!(next_page_href("/discounts", "abc", None), "/discounts?cursor=abc");
    }

    #[test]
    fn test_discount_gid() {
        assert_eq!(discount_gid("42"), "gid://shopify/DiscountCodeNode/42");
        assert_eq!(
            discount_gid("gid://shopify/DiscountCodeNode/7"),
            "gid://shopify/DiscountCodeNode/7"
        );
    }
}
