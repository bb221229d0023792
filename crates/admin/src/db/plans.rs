//! Pricing plan repository.

use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use storekeep_core::{BillingInterval, PlanId};

use super::{RepositoryError, money};
use crate::models::Plan;

const PLAN_COLUMNS: &str = "id, handle, name, price, currency_code, interval, trial_days, \
     capped_amount, usage_terms, features, position, active";

#[derive(sqlx::FromRow)]
struct PlanRow {
    id: i32,
    handle: String,
    name: String,
    price: Decimal,
    currency_code: String,
    interval: BillingInterval,
    trial_days: i32,
    capped_amount: Option<Decimal>,
    usage_terms: Option<String>,
    features: serde_json::Value,
    position: i32,
    active: bool,
}

impl TryFrom<PlanRow> for Plan {
    type Error = RepositoryError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        let features: Vec<String> = serde_json::from_value(row.features)
            .map_err(|e| RepositoryError::DataCorruption(format!("invalid plan features: {e}")))?;
        let capped_amount = row
            .capped_amount
            .map(|amount| money(amount, &row.currency_code))
            .transpose()?;

        Ok(Self {
            id: PlanId::new(row.id),
            handle: row.handle,
            name: row.name,
            price: money(row.price, &row.currency_code)?,
            interval: row.interval,
            trial_days: row.trial_days,
            capped_amount,
            usage_terms: row.usage_terms,
            features,
            position: row.position,
            active: row.active,
        })
    }
}

/// A plan definition as written in the catalog file synced by the CLI.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanInput {
    pub handle: String,
    pub name: String,
    pub price: Decimal,
    #[serde(default = "default_currency")]
    pub currency_code: String,
    #[serde(default)]
    pub interval: BillingInterval,
    #[serde(default)]
    pub trial_days: i32,
    #[serde(default)]
    pub capped_amount: Option<Decimal>,
    #[serde(default)]
    pub usage_terms: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub position: i32,
}

fn default_currency() -> String {
    "USD".to_string()
}

/// Repository for pricing plans.
pub struct PlanRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PlanRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Plans shown on the billing page, in display order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_active(&self) -> Result<Vec<Plan>, RepositoryError> {
        let rows = sqlx::query_as::<_, PlanRow>(&format!(
            "SELECT {PLAN_COLUMNS} FROM app.plan WHERE active ORDER BY position, price"
        ))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Every plan including retired ones.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(&self) -> Result<Vec<Plan>, RepositoryError> {
        let rows = sqlx::query_as::<_, PlanRow>(&format!(
            "SELECT {PLAN_COLUMNS} FROM app.plan ORDER BY active DESC, position, price"
        ))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: PlanId) -> Result<Option<Plan>, RepositoryError> {
        let row = sqlx::query_as::<_, PlanRow>(&format!(
            "SELECT {PLAN_COLUMNS} FROM app.plan WHERE id = $1"
        ))
        .bind(id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_handle(&self, handle: &str) -> Result<Option<Plan>, RepositoryError> {
        let row = sqlx::query_as::<_, PlanRow>(&format!(
            "SELECT {PLAN_COLUMNS} FROM app.plan WHERE handle = $1"
        ))
        .bind(handle)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Insert or update a plan by handle and mark it active.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails, including
    /// check violations (e.g., a cap without usage terms).
    pub async fn upsert(&self, input: &PlanInput) -> Result<Plan, RepositoryError> {
        let features = serde_json::to_value(&input.features)
            .map_err(|e| RepositoryError::DataCorruption(format!("invalid plan features: {e}")))?;

        let row = sqlx::query_as::<_, PlanRow>(&format!(
            r"
            INSERT INTO app.plan (handle, name, price, currency_code, interval, trial_days,
                                  capped_amount, usage_terms, features, position, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, TRUE)
            ON CONFLICT (handle) DO UPDATE SET
                name = EXCLUDED.name,
                price = EXCLUDED.price,
                currency_code = EXCLUDED.currency_code,
                interval = EXCLUDED.interval,
                trial_days = EXCLUDED.trial_days,
                capped_amount = EXCLUDED.capped_amount,
                usage_terms = EXCLUDED.usage_terms,
                features = EXCLUDED.features,
                position = EXCLUDED.position,
                active = TRUE
            RETURNING {PLAN_COLUMNS}
            "
        ))
        .bind(&input.handle)
        .bind(&input.name)
        .bind(input.price)
        .bind(&input.currency_code)
        .bind(input.interval)
        .bind(input.trial_days)
        .bind(input.capped_amount)
        .bind(&input.usage_terms)
        .bind(features)
        .bind(input.position)
        .fetch_one(self.pool)
        .await?;

        row.try_into()
    }

    /// Retire every active plan whose handle is not in `keep`.
    ///
    /// Returns the number of plans deactivated.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn deactivate_except(&self, keep: &[String]) -> Result<u64, RepositoryError> {
        let result =
            sqlx::query("UPDATE app.plan SET active = FALSE WHERE active AND NOT (handle = ANY($1))")
                .bind(keep)
                .execute(self.pool)
                .await?;

        Ok(result.rows_affected())
    }
}
