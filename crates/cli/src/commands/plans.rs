//! Plan catalog commands.
//!
//! The catalog is a YAML file with a top-level `plans` list:
//!
//! ```yaml
//! plans:
//!   - handle: starter
//!     name: Starter
//!     price: "9.00"
//!     trial_days: 7
//!     features: ["Discount editor", "Metafield editor"]
//! ```

use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use storekeep_admin::db::{PlanInput, PlanRepository};
use storekeep_core::{BillingInterval, CurrencyCode};

use super::{CliError, read_file};

#[derive(Debug, Deserialize)]
struct Catalog {
    plans: Vec<PlanInput>,
}

/// Parse and check a catalog file.
///
/// # Errors
///
/// Returns an error for invalid YAML, duplicate handles, non-positive
/// prices, unknown currencies, or a usage cap on an annual plan.
pub fn parse_catalog(yaml: &str) -> Result<Vec<PlanInput>, CliError> {
    let catalog: Catalog = serde_yaml::from_str(yaml)?;

    let mut seen = HashSet::new();
    for plan in &catalog.plans {
        if plan.handle.trim().is_empty() {
            return Err(CliError::Invalid("plan handle cannot be empty".into()));
        }
        if !seen.insert(plan.handle.as_str()) {
            return Err(CliError::Invalid(format!(
                "duplicate plan handle: {}",
                plan.handle
            )));
        }
        if plan.price <= Decimal::ZERO {
            return Err(CliError::Invalid(format!(
                "plan {}: price must be positive",
                plan.handle
            )));
        }
        if plan.currency_code.parse::<CurrencyCode>().is_err() {
            return Err(CliError::Invalid(format!(
                "plan {}: unknown currency {}",
                plan.handle, plan.currency_code
            )));
        }
        if plan.trial_days < 0 {
            return Err(CliError::Invalid(format!(
                "plan {}: trial_days cannot be negative",
                plan.handle
            )));
        }
        match plan.capped_amount {
            Some(_) if plan.interval == BillingInterval::Annual => {
                return Err(CliError::Invalid(format!(
                    "plan {}: usage charges need a 30-day interval",
                    plan.handle
                )));
            }
            Some(cap) if cap <= Decimal::ZERO => {
                return Err(CliError::Invalid(format!(
                    "plan {}: capped_amount must be positive",
                    plan.handle
                )));
            }
            _ => {}
        }
    }

    Ok(catalog.plans)
}

/// Upsert every plan in `path`; with `prune`, deactivate the rest.
///
/// # Errors
///
/// Returns an error if the file is invalid or a query fails.
pub async fn sync(pool: &PgPool, path: &str, prune: bool) -> Result<(), CliError> {
    let plans = parse_catalog(&read_file(path).await?)?;
    let repo = PlanRepository::new(pool);

    for input in &plans {
        let plan = repo.upsert(input).await?;
        tracing::info!(
            "  {} - {} {}/{}",
            plan.handle,
            plan.name,
            plan.price.display(),
            plan.interval.label()
        );
    }
    tracing::info!("Synced {} plans", plans.len());

    if prune {
        let keep: Vec<String> = plans.into_iter().map(|p| p.handle).collect();
        let removed = repo.deactivate_except(&keep).await?;
        tracing::info!("Deactivated {removed} plans not in {path}");
    }
    Ok(())
}

/// Print every plan, active or not.
///
/// # Errors
///
/// Returns an error if the query fails.
pub async fn list(pool: &PgPool) -> Result<(), CliError> {
    let plans = PlanRepository::new(pool).list_all().await?;
    if plans.is_empty() {
        tracing::info!("No plans. Run `storekeep plans sync <file>` first.");
        return Ok(());
    }

    for plan in plans {
        let cap = plan
            .capped_amount
            .map(|c| format!(", usage cap {}", c.display()))
            .unwrap_or_default();
        tracing::info!(
            "{:<16} {:<20} {}/{}{}, {} trial days{}",
            plan.handle,
            plan.name,
            plan.price.display(),
            plan.interval.label(),
            cap,
            plan.trial_days,
            if plan.active { "" } else { " (inactive)" }
        );
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
plans:
  - handle: starter
    name: Starter
    price: "9.00"
    trial_days: 7
    features: ["Discounts"]
  - handle: growth
    name: Growth
    price: "29.00"
    capped_amount: "100.00"
    usage_terms: "$0.01 per processed image"
  - handle: annual
    name: Annual
    price: "290.00"
    interval: annual
"#;

    #[test]
    fn test_parse_catalog() {
        let plans = parse_catalog(CATALOG).unwrap();
        assert_eq!(plans.len(), 3);

        let starter = plans.first().unwrap();
        assert_eq!(starter.handle, "starter");
        assert_eq!(starter.currency_code, "USD");
        assert_eq!(starter.interval, BillingInterval::Every30Days);
        assert_eq!(starter.trial_days, 7);

        let annual = plans.get(2).unwrap();
        assert_eq!(annual.interval, BillingInterval::Annual);
        assert!(annual.capped_amount.is_none());
    }

    #[test]
    fn test_duplicate_handle_rejected() {
        let yaml = r#"
plans:
  - { handle: a, name: A, price: "1" }
  - { handle: a, name: B, price: "2" }
"#;
        let err = parse_catalog(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate plan handle: a"));
    }

    #[test]
    fn test_non_positive_price_rejected() {
        let yaml = r#"
plans:
  - { handle: free, name: Free, price: "0" }
"#;
        assert!(parse_catalog(yaml).is_err());
    }

    #[test]
    fn test_annual_usage_cap_rejected() {
        let yaml = r#"
plans:
  - { handle: big, name: Big, price: "100", interval: annual, capped_amount: "50" }
"#;
        let err = parse_catalog(yaml).unwrap_err();
        assert!(err.to_string().contains("30-day"));
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(
            parse_catalog("plans: [").unwrap_err(),
            CliError::Yaml(_)
        ));
    }
}
