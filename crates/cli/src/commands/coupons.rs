//! App-level promo code commands.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use storekeep_admin::db::{CouponRepository, PlanRepository, RepositoryError};
use storekeep_admin::models::NewCoupon;
use storekeep_admin::services::normalize_code;
use storekeep_core::CouponKind;

use super::CliError;

/// Raw `coupons create` arguments.
#[derive(Debug, Clone)]
pub struct CreateArgs {
    pub code: String,
    pub kind: String,
    pub value: String,
    pub duration: Option<i32>,
    pub plan: Option<String>,
    pub max_redemptions: Option<i32>,
    pub expires: Option<String>,
}

/// Validated coupon fields, before the plan handle is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouponSpec {
    pub code: String,
    pub kind: CouponKind,
    pub value: Decimal,
    pub duration_intervals: Option<i32>,
    pub plan: Option<String>,
    pub max_redemptions: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CreateArgs {
    /// Check the arguments without touching the database.
    ///
    /// # Errors
    ///
    /// Returns `CliError::Invalid` describing the first bad argument.
    pub fn validate(&self) -> Result<CouponSpec, CliError> {
        let code = normalize_code(&self.code);
        if code.is_empty() || code.contains(char::is_whitespace) {
            return Err(CliError::Invalid(
                "code must be non-empty with no spaces".into(),
            ));
        }

        let kind = CouponKind::from_str(&self.kind)
            .map_err(|e| CliError::Invalid(format!("{e} (use percentage or fixed_amount)")))?;

        let value = Decimal::from_str(self.value.trim())
            .map_err(|_| CliError::Invalid(format!("invalid value: {}", self.value)))?;
        if value <= Decimal::ZERO {
            return Err(CliError::Invalid("value must be positive".into()));
        }
        if kind == CouponKind::Percentage && value > Decimal::ONE_HUNDRED {
            return Err(CliError::Invalid(
                "percentage cannot exceed 100".into(),
            ));
        }

        if self.duration.is_some_and(|d| d < 1) {
            return Err(CliError::Invalid("duration must be at least 1".into()));
        }
        if self.max_redemptions.is_some_and(|m| m < 1) {
            return Err(CliError::Invalid(
                "max redemptions must be at least 1".into(),
            ));
        }

        let expires_at = self
            .expires
            .as_deref()
            .map(parse_expiry)
            .transpose()?;

        Ok(CouponSpec {
            code,
            kind,
            value,
            duration_intervals: self.duration,
            plan: self.plan.clone(),
            max_redemptions: self.max_redemptions,
            expires_at,
        })
    }
}

/// `YYYY-MM-DD` as the last second of that day in UTC.
fn parse_expiry(raw: &str) -> Result<DateTime<Utc>, CliError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| CliError::Invalid(format!("invalid expiry date: {raw}")))
}

/// Create a coupon.
///
/// # Errors
///
/// Returns an error for invalid arguments, an unknown plan, or a duplicate code.
pub async fn create(pool: &PgPool, args: &CreateArgs) -> Result<(), CliError> {
    let fields = args.validate()?;

    let plan_id = match &fields.plan {
        Some(handle) => Some(
            PlanRepository::new(pool)
                .get_by_handle(handle)
                .await?
                .ok_or_else(|| CliError::Invalid(format!("unknown plan: {handle}")))?
                .id,
        ),
        None => None,
    };

    let input = NewCoupon {
        code: fields.code,
        kind: fields.kind,
        value: fields.value,
        duration_intervals: fields.duration_intervals,
        plan_id,
        max_redemptions: fields.max_redemptions,
        expires_at: fields.expires_at,
    };

    let coupon = match CouponRepository::new(pool).create(&input).await {
        Ok(c) => c,
        Err(RepositoryError::Conflict(_)) => {
            return Err(CliError::Invalid(format!(
                "coupon already exists: {}",
                input.code
            )));
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!("Created coupon {} (id {})", coupon.code, coupon.id);
    Ok(())
}

/// Print every coupon.
///
/// # Errors
///
/// Returns an error if the query fails.
pub async fn list(pool: &PgPool) -> Result<(), CliError> {
    let coupons = CouponRepository::new(pool).list_all().await?;
    if coupons.is_empty() {
        tracing::info!("No coupons");
        return Ok(());
    }

    for c in coupons {
        let value = match c.kind {
            CouponKind::Percentage => format!("{}% off", c.value.normalize()),
            CouponKind::FixedAmount => format!("{} off", c.value.normalize()),
        };
        let duration = c
            .duration_intervals
            .map_or_else(|| "forever".to_string(), |d| format!("{d} intervals"));
        let limit = c
            .max_redemptions
            .map_or_else(|| "unlimited".to_string(), |m| m.to_string());
        let expires = c
            .expires_at
            .map_or_else(|| "never".to_string(), |e| e.format("%Y-%m-%d").to_string());

        tracing::info!(
            "{:<16} {:<12} {:<12} used {}/{} expires {}{}",
            c.code,
            value,
            duration,
            c.redemptions,
            limit,
            expires,
            if c.active { "" } else { " (inactive)" }
        );
    }
    Ok(())
}

/// Stop a coupon from being redeemed. Existing discounts keep running.
///
/// # Errors
///
/// Returns an error if the code does not exist.
pub async fn deactivate(pool: &PgPool, code: &str) -> Result<(), CliError> {
    let code = normalize_code(code);
    match CouponRepository::new(pool).deactivate(&code).await {
        Ok(()) => {
            tracing::info!("Deactivated coupon {code}");
            Ok(())
        }
        Err(RepositoryError::NotFound) => Err(CliError::Invalid(format!("no coupon {code}"))),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn args(kind: &str, value: &str) -> CreateArgs {
        CreateArgs {
            code: " launch20 ".into(),
            kind: kind.into(),
            value: value.into(),
            duration: Some(3),
            plan: None,
            max_redemptions: None,
            expires: None,
        }
    }

    #[test]
    fn test_validate_percentage() {
        let fields = args("percentage", "20").validate().unwrap();
        assert_eq!(fields.code, "LAUNCH20");
        assert_eq!(fields.kind, CouponKind::Percentage);
        assert_eq!(fields.value, Decimal::from(20));
        assert_eq!(fields.duration_intervals, Some(3));
    }

    #[test]
    fn test_validate_fixed_with_expiry() {
        let mut a = args("fixed_amount", "5.50");
        a.expires = Some("2027-01-31".into());
        let fields = a.validate().unwrap();
        assert_eq!(fields.kind, CouponKind::FixedAmount);
        assert_eq!(
            fields.expires_at.unwrap().to_rfc3339(),
            "2027-01-31T23:59:59+00:00"
        );
    }

    #[test]
    fn test_validate_rejects() {
        assert!(args("percentage", "120").validate().is_err());
        assert!(args("percentage", "0").validate().is_err());
        assert!(args("bogus", "10").validate().is_err());
        assert!(args("fixed_amount", "ten").validate().is_err());

        let mut a = args("percentage", "10");
        a.duration = Some(0);
        assert!(a.validate().is_err());

        let mut a = args("percentage", "10");
        a.code = "TWO WORDS".into();
        assert!(a.validate().is_err());

        let mut a = args("percentage", "10");
        a.expires = Some("31/01/2027".into());
        assert!(a.validate().is_err());
    }
}
