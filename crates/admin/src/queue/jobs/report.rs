//! Monthly billing report.
//!
//! Writes a CSV of the shop's subscription, usage and one-time charges for a
//! calendar month into file storage, then queues an email with it attached.

use std::fmt::Write;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use storekeep_core::JobKind;
use tracing::info;

use super::EmailJob;
use crate::db::{PurchaseRepository, ShopRepository, SubscriptionRepository};
use crate::models::{Job, OneTimePurchase, Subscription, UsageCharge};
use crate::queue::{JobError, JobHandler, JobPayload, decode};
use crate::services::EmailMessage;
use crate::state::AppState;

const fn default_send_email() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportJob {
    pub year: i32,
    pub month: u32,
    #[serde(default = "default_send_email")]
    pub send_email: bool,
}

impl ReportJob {
    /// Report for the calendar month containing `at`.
    #[must_use]
    pub fn for_month(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
            send_email: true,
        }
    }

    fn filename(&self) -> String {
        format!("billing-{:04}-{:02}.csv", self.year, self.month)
    }
}

impl JobPayload for ReportJob {
    const KIND: JobKind = JobKind::Report;
}

/// `[start of month, start of next month)` in UTC.
#[must_use]
pub fn month_bounds(year: i32, month: u32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year.checked_add(1)?, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((
        start.and_hms_opt(0, 0, 0)?.and_utc(),
        end.and_hms_opt(0, 0, 0)?.and_utc(),
    ))
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Build the report CSV for `[from, to)`.
///
/// Subscriptions are listed when they were billable at any point of the
/// period; usage charges and purchases when they were created in it.
#[must_use]
pub fn build_report_csv(
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    subscriptions: &[Subscription],
    usage: &[UsageCharge],
    purchases: &[OneTimePurchase],
) -> String {
    let mut rows: Vec<(DateTime<Utc>, &str, &str, &str, String, &str)> = Vec::new();

    for sub in subscriptions {
        let Some(activated_at) = sub.activated_at else {
            continue;
        };
        let ended_before = sub.cancelled_at.is_some_and(|c| c < from);
        if activated_at >= to || ended_before {
            continue;
        }
        rows.push((
            activated_at.max(from),
            "subscription",
            &sub.name,
            sub.status.as_str(),
            sub.price.amount_string(),
            sub.price.currency_code.as_str(),
        ));
    }

    for charge in usage.iter().filter(|c| c.created_at >= from && c.created_at < to) {
        rows.push((
            charge.created_at,
            "usage",
            &charge.description,
            "accepted",
            charge.price.amount_string(),
            charge.price.currency_code.as_str(),
        ));
    }

    for purchase in purchases
        .iter()
        .filter(|p| p.created_at >= from && p.created_at < to)
    {
        rows.push((
            purchase.created_at,
            "one_time",
            &purchase.name,
            purchase.status.as_str(),
            purchase.price.amount_string(),
            purchase.price.currency_code.as_str(),
        ));
    }

    rows.sort_by_key(|row| row.0);

    let mut csv = String::from("date,type,description,status,amount,currency\n");
    for (date, kind, description, status, amount, currency) in rows {
        let _ = writeln!(
            csv,
            "{},{},{},{},{},{}",
            date.format("%Y-%m-%d"),
            kind,
            csv_field(description),
            status,
            amount,
            currency
        );
    }
    csv
}

pub struct ReportHandler;

#[async_trait]
impl JobHandler for ReportHandler {
    fn kind(&self) -> JobKind {
        JobKind::Report
    }

    async fn handle(&self, job: &Job, state: &AppState) -> Result<(), JobError> {
        let payload: ReportJob = decode(job)?;
        let (from, to) = month_bounds(payload.year, payload.month).ok_or_else(|| {
            JobError::Permanent(format!("invalid month {}-{}", payload.year, payload.month))
        })?;

        let shop_id = job
            .shop_id
            .ok_or_else(|| JobError::Permanent("report job has no shop".to_string()))?;
        let shop = ShopRepository::new(state.pool())
            .get(shop_id)
            .await?
            .ok_or_else(|| JobError::Permanent(format!("shop {shop_id} not found")))?;

        let subscriptions = SubscriptionRepository::new(state.pool());
        let subs = subscriptions.list_for_shop(shop.id).await?;
        let usage = subscriptions.usage_for_shop_between(shop.id, from, to).await?;
        let purchases = PurchaseRepository::new(state.pool())
            .list_for_shop(shop.id)
            .await?;

        let csv = build_report_csv(from, to, &subs, &usage, &purchases);
        let file = state
            .files()
            .save(
                state.pool(),
                shop.id,
                &payload.filename(),
                "text/csv",
                csv.as_bytes(),
            )
            .await?;
        info!(shop = %shop.domain, file = %file.id, "Billing report stored");

        if !payload.send_email {
            return Ok(());
        }
        let Some(to_address) = &shop.email else {
            info!(shop = %shop.domain, "Shop has no email; report not sent");
            return Ok(());
        };

        let email = EmailJob {
            to: to_address.clone(),
            message: EmailMessage::ReportReady {
                shop_name: shop.display_name().to_string(),
                period_label: from.format("%B %Y").to_string(),
                admin_url: format!(
                    "{}/files",
                    shop.domain.admin_app_url(&state.config().shopify.api_key)
                ),
            },
            attachment: Some(file.id),
        };
        state
            .queue()
            .enqueue(Some(shop.id), &email, Duration::ZERO)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use storekeep_core::{
        CurrencyCode, Money, OneTimePurchaseId, PlanId, PurchaseStatus, ShopId, SubscriptionId,
        SubscriptionStatus, UsageChargeId,
    };

    use super::*;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn usd(amount: &str) -> Money {
        Money::parse(amount, "USD").unwrap()
    }

    fn subscription(activated: Option<DateTime<Utc>>, cancelled: Option<DateTime<Utc>>) -> Subscription {
        Subscription {
            id: SubscriptionId::new(1),
            shop_id: ShopId::new(1),
            plan_id: PlanId::new(1),
            shopify_id: "gid://shopify/AppSubscription/1".to_string(),
            usage_line_item_id: None,
            name: "Pro".to_string(),
            status: SubscriptionStatus::Active,
            price: usd("19.90"),
            capped_amount: None,
            trial_days: 0,
            test: false,
            coupon_id: None,
            current_period_end: None,
            activated_at: activated,
            cancelled_at: cancelled,
            created_at: at(2026, 1, 1),
            updated_at: at(2026, 1, 1),
        }
    }

    fn usage(description: &str, created_at: DateTime<Utc>) -> UsageCharge {
        UsageCharge {
            id: UsageChargeId::new(1),
            subscription_id: SubscriptionId::new(1),
            shopify_id: "gid://shopify/AppUsageRecord/1".to_string(),
            description: description.to_string(),
            price: usd("2.50"),
            idempotency_key: "k".to_string(),
            created_at,
        }
    }

    #[test]
    fn test_month_bounds() {
        let (from, to) = month_bounds(2026, 12).unwrap();
        assert_eq!(from, Utc.with_ymd_and_hms(2026, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(to, Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap());
        assert!(month_bounds(2026, 13).is_none());
        assert!(month_bounds(2026, 0).is_none());
    }

    #[test]
    fn test_for_month_filename() {
        let job = ReportJob::for_month(at(2026, 3, 9));
        assert_eq!(job.filename(), "billing-2026-03.csv");
        assert!(job.send_email);
    }

    #[test]
    fn test_send_email_defaults_on() {
        let job: ReportJob = serde_json::from_str(r#"{"year":2026,"month":2}"#).unwrap();
        assert!(job.send_email);
    }

    #[test]
    fn test_csv_rows_in_period() {
        let (from, to) = month_bounds(2026, 3).unwrap();
        let subs = vec![
            subscription(Some(at(2026, 2, 10)), None),
            // cancelled before March
            subscription(Some(at(2026, 1, 5)), Some(at(2026, 2, 1))),
            // never activated
            subscription(None, None),
        ];
        let charges = vec![
            usage("Sync, 100 items", at(2026, 3, 20)),
            usage("Outside", at(2026, 4, 2)),
        ];
        let purchases = vec![OneTimePurchase {
            id: OneTimePurchaseId::new(1),
            shop_id: ShopId::new(1),
            shopify_id: "gid://shopify/AppPurchaseOneTime/1".to_string(),
            name: "Setup \"white glove\"".to_string(),
            price: Money::new(rust_decimal::Decimal::new(4900, 2), CurrencyCode::USD),
            status: PurchaseStatus::Active,
            test: false,
            created_at: at(2026, 3, 5),
            updated_at: at(2026, 3, 5),
        }];

        let csv = build_report_csv(from, to, &subs, &charges, &purchases);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "date,type,description,status,amount,currency");
        assert_eq!(lines.len(), 4, "{csv}");
        assert!(lines[1].starts_with("2026-03-01,subscription,Pro,active,19.90,USD"));
        assert!(lines[2].starts_with("2026-03-05,one_time,\"Setup \"\"white glove\"\"\""));
        assert!(lines[3].starts_with("2026-03-20,usage,\"Sync, 100 items\",accepted,2.50,USD"));
    }
}
