//! App-level promo code repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use storekeep_core::{CouponId, CouponKind, PlanId, ShopId, SubscriptionId};

use super::{RepositoryError, conflict_on_unique};
use crate::models::{Coupon, NewCoupon};

const COUPON_COLUMNS: &str = "id, code, kind, value, duration_intervals, plan_id, max_redemptions, \
     redemptions, expires_at, active, created_at";

#[derive(sqlx::FromRow)]
struct CouponRow {
    id: i32,
    code: String,
    kind: CouponKind,
    value: Decimal,
    duration_intervals: Option<i32>,
    plan_id: Option<i32>,
    max_redemptions: Option<i32>,
    redemptions: i32,
    expires_at: Option<DateTime<Utc>>,
    active: bool,
    created_at: DateTime<Utc>,
}

impl From<CouponRow> for Coupon {
    fn from(row: CouponRow) -> Self {
        Self {
            id: CouponId::new(row.id),
            code: row.code,
            kind: row.kind,
            value: row.value,
            duration_intervals: row.duration_intervals,
            plan_id: row.plan_id.map(PlanId::new),
            max_redemptions: row.max_redemptions,
            redemptions: row.redemptions,
            expires_at: row.expires_at,
            active: row.active,
            created_at: row.created_at,
        }
    }
}

/// Repository for coupons and their redemptions.
pub struct CouponRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CouponRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a coupon. Codes are stored as given and matched case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the code already exists.
    pub async fn create(&self, input: &NewCoupon) -> Result<Coupon, RepositoryError> {
        let row = sqlx::query_as::<_, CouponRow>(&format!(
            r"
            INSERT INTO app.coupon (code, kind, value, duration_intervals, plan_id,
                                    max_redemptions, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {COUPON_COLUMNS}
            "
        ))
        .bind(input.code.trim())
        .bind(input.kind)
        .bind(input.value)
        .bind(input.duration_intervals)
        .bind(input.plan_id.map(|p| p.as_i32()))
        .bind(input.max_redemptions)
        .bind(input.expires_at)
        .fetch_one(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "coupon code already exists"))?;

        Ok(row.into())
    }

    /// Find a coupon by code, ignoring case and surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_code(&self, code: &str) -> Result<Option<Coupon>, RepositoryError> {
        let row = sqlx::query_as::<_, CouponRow>(&format!(
            "SELECT {COUPON_COLUMNS} FROM app.coupon WHERE LOWER(code) = LOWER($1)"
        ))
        .bind(code.trim())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: CouponId) -> Result<Option<Coupon>, RepositoryError> {
        let row = sqlx::query_as::<_, CouponRow>(&format!(
            "SELECT {COUPON_COLUMNS} FROM app.coupon WHERE id = $1"
        ))
        .bind(id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(&self) -> Result<Vec<Coupon>, RepositoryError> {
        let rows = sqlx::query_as::<_, CouponRow>(&format!(
            "SELECT {COUPON_COLUMNS} FROM app.coupon ORDER BY active DESC, created_at DESC"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Soft-delete a coupon.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no coupon has this code.
    pub async fn deactivate(&self, code: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE app.coupon SET active = FALSE WHERE LOWER(code) = LOWER($1)")
            .bind(code.trim())
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Whether the shop already redeemed this coupon.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn has_redeemed(
        &self,
        coupon_id: CouponId,
        shop_id: ShopId,
    ) -> Result<bool, RepositoryError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM app.coupon_redemption WHERE coupon_id = $1 AND shop_id = $2)",
        )
        .bind(coupon_id.as_i32())
        .bind(shop_id.as_i32())
        .fetch_one(self.pool)
        .await?;

        Ok(exists)
    }

    /// Record a redemption and bump the counter atomically.
    ///
    /// Returns `false` when the shop had already redeemed the coupon (no-op).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the coupon ran out of redemptions
    /// in the meantime.
    pub async fn redeem(
        &self,
        coupon_id: CouponId,
        shop_id: ShopId,
        subscription_id: SubscriptionId,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r"
            INSERT INTO app.coupon_redemption (coupon_id, shop_id, subscription_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (coupon_id, shop_id) DO NOTHING
            ",
        )
        .bind(coupon_id.as_i32())
        .bind(shop_id.as_i32())
        .bind(subscription_id.as_i32())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let bumped = sqlx::query(
            r"
            UPDATE app.coupon
            SET redemptions = redemptions + 1
            WHERE id = $1 AND (max_redemptions IS NULL OR redemptions < max_redemptions)
            ",
        )
        .bind(coupon_id.as_i32())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if bumped == 0 {
            tx.rollback().await?;
            return Err(RepositoryError::Conflict("coupon has no redemptions left".to_owned()));
        }

        tx.commit().await?;
        Ok(true)
    }
}
