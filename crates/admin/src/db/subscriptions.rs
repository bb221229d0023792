//! Subscription and usage charge repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use storekeep_core::{
    CouponId, Money, PlanId, ShopId, SubscriptionId, SubscriptionStatus, UsageChargeId,
};

use super::{RepositoryError, conflict_on_unique, money};
use crate::models::{Subscription, UsageCharge};

const SUBSCRIPTION_COLUMNS: &str = "id, shop_id, plan_id, shopify_id, usage_line_item_id, name, \
     status, price, currency_code, capped_amount, trial_days, test, coupon_id, current_period_end, \
     activated_at, cancelled_at, created_at, updated_at";

const USAGE_COLUMNS: &str =
    "id, subscription_id, shopify_id, description, price, currency_code, idempotency_key, created_at";

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    id: i32,
    shop_id: i32,
    plan_id: i32,
    shopify_id: String,
    usage_line_item_id: Option<String>,
    name: String,
    status: SubscriptionStatus,
    price: Decimal,
    currency_code: String,
    capped_amount: Option<Decimal>,
    trial_days: i32,
    test: bool,
    coupon_id: Option<i32>,
    current_period_end: Option<DateTime<Utc>>,
    activated_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = RepositoryError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let capped_amount = row
            .capped_amount
            .map(|amount| money(amount, &row.currency_code))
            .transpose()?;

        Ok(Self {
            id: SubscriptionId::new(row.id),
            shop_id: ShopId::new(row.shop_id),
            plan_id: PlanId::new(row.plan_id),
            shopify_id: row.shopify_id,
            usage_line_item_id: row.usage_line_item_id,
            name: row.name,
            status: row.status,
            price: money(row.price, &row.currency_code)?,
            capped_amount,
            trial_days: row.trial_days,
            test: row.test,
            coupon_id: row.coupon_id.map(CouponId::new),
            current_period_end: row.current_period_end,
            activated_at: row.activated_at,
            cancelled_at: row.cancelled_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UsageChargeRow {
    id: i32,
    subscription_id: i32,
    shopify_id: String,
    description: String,
    price: Decimal,
    currency_code: String,
    idempotency_key: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UsageChargeRow> for UsageCharge {
    type Error = RepositoryError;

    fn try_from(row: UsageChargeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: UsageChargeId::new(row.id),
            subscription_id: SubscriptionId::new(row.subscription_id),
            shopify_id: row.shopify_id,
            description: row.description,
            price: money(row.price, &row.currency_code)?,
            idempotency_key: row.idempotency_key,
            created_at: row.created_at,
        })
    }
}

/// Input for persisting a freshly created (pending) subscription.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub shop_id: ShopId,
    pub plan_id: PlanId,
    pub shopify_id: String,
    pub usage_line_item_id: Option<String>,
    pub name: String,
    pub price: Money,
    pub capped_amount: Option<Money>,
    pub trial_days: i32,
    pub test: bool,
    pub coupon_id: Option<CouponId>,
}

/// Repository for subscriptions and their usage charges.
pub struct SubscriptionRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SubscriptionRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Persist a pending subscription.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the remote ID is already stored.
    pub async fn create(&self, input: &NewSubscription) -> Result<Subscription, RepositoryError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r"
            INSERT INTO app.subscription (shop_id, plan_id, shopify_id, usage_line_item_id, name,
                                          price, currency_code, capped_amount, trial_days, test,
                                          coupon_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {SUBSCRIPTION_COLUMNS}
            "
        ))
        .bind(input.shop_id.as_i32())
        .bind(input.plan_id.as_i32())
        .bind(&input.shopify_id)
        .bind(&input.usage_line_item_id)
        .bind(&input.name)
        .bind(input.price.amount)
        .bind(input.price.currency_code.as_str())
        .bind(input.capped_amount.map(|m| m.amount))
        .bind(input.trial_days)
        .bind(input.test)
        .bind(input.coupon_id.map(|c| c.as_i32()))
        .fetch_one(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "subscription already recorded"))?;

        row.try_into()
    }

    /// Look up a subscription by its remote GID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_shopify_id(
        &self,
        shopify_id: &str,
    ) -> Result<Option<Subscription>, RepositoryError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM app.subscription WHERE shopify_id = $1"
        ))
        .bind(shopify_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// The shop's current subscription: the newest active one, else the newest frozen one.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn current_for_shop(
        &self,
        shop_id: ShopId,
    ) -> Result<Option<Subscription>, RepositoryError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r"
            SELECT {SUBSCRIPTION_COLUMNS} FROM app.subscription
            WHERE shop_id = $1 AND status IN ('active', 'frozen')
            ORDER BY (status = 'active') DESC, created_at DESC
            LIMIT 1
            "
        ))
        .bind(shop_id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// All subscriptions ever created for a shop, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_shop(&self, shop_id: ShopId) -> Result<Vec<Subscription>, RepositoryError> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM app.subscription WHERE shop_id = $1 ORDER BY created_at DESC"
        ))
        .bind(shop_id.as_i32())
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Mark a subscription active.
    ///
    /// `activated_at` is only set the first time so trial accounting stays stable.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the subscription doesn't exist.
    pub async fn activate(
        &self,
        id: SubscriptionId,
        current_period_end: Option<DateTime<Utc>>,
    ) -> Result<Subscription, RepositoryError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r"
            UPDATE app.subscription
            SET status = 'active',
                activated_at = COALESCE(activated_at, NOW()),
                current_period_end = COALESCE($1, current_period_end)
            WHERE id = $2
            RETURNING {SUBSCRIPTION_COLUMNS}
            "
        ))
        .bind(current_period_end)
        .bind(id.as_i32())
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    /// Update the status; cancelling also stamps `cancelled_at`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the subscription doesn't exist.
    pub async fn set_status(
        &self,
        id: SubscriptionId,
        status: SubscriptionStatus,
        current_period_end: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE app.subscription
            SET status = $1,
                cancelled_at = CASE WHEN $1 = 'cancelled'::app.subscription_status
                                    THEN COALESCE(cancelled_at, NOW()) ELSE cancelled_at END,
                current_period_end = COALESCE($2, current_period_end)
            WHERE id = $3
            ",
        )
        .bind(status)
        .bind(current_period_end)
        .bind(id.as_i32())
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Cancel every other active or frozen subscription of the shop.
    ///
    /// The billing API replaces the previous subscription on approval; this
    /// mirrors that locally.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn cancel_others(
        &self,
        shop_id: ShopId,
        keep: SubscriptionId,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE app.subscription
            SET status = 'cancelled', cancelled_at = COALESCE(cancelled_at, NOW())
            WHERE shop_id = $1 AND id <> $2 AND status IN ('active', 'frozen', 'pending')
            ",
        )
        .bind(shop_id.as_i32())
        .bind(keep.as_i32())
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Cancel every live subscription of a shop (uninstall).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn cancel_all_for_shop(&self, shop_id: ShopId) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE app.subscription
            SET status = 'cancelled', cancelled_at = COALESCE(cancelled_at, NOW())
            WHERE shop_id = $1 AND status IN ('active', 'frozen', 'pending')
            ",
        )
        .bind(shop_id.as_i32())
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    // -------------------------------------------------------------------------
    // Usage charges
    // -------------------------------------------------------------------------

    /// Sum of usage charged on a subscription since `since`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn usage_total_since(
        &self,
        subscription_id: SubscriptionId,
        since: DateTime<Utc>,
    ) -> Result<Decimal, RepositoryError> {
        let total: Decimal = sqlx::query_scalar(
            r"
            SELECT COALESCE(SUM(price), 0)
            FROM app.usage_charge
            WHERE subscription_id = $1 AND created_at >= $2
            ",
        )
        .bind(subscription_id.as_i32())
        .bind(since)
        .fetch_one(self.pool)
        .await?;

        Ok(total)
    }

    /// Open a transaction holding the subscription's row lock.
    ///
    /// Usage writes for the same subscription queue behind the lock, so the
    /// cap check and the insert see each other's charges.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the subscription is gone, or
    /// `RepositoryError::Database` if the query fails.
    pub async fn lock_usage(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<UsageLock, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query_scalar::<_, i32>(LOCK_SUBSCRIPTION_SQL)
            .bind(subscription_id.as_i32())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        Ok(UsageLock {
            tx,
            subscription_id,
        })
    }

    /// Most recent usage charges of a subscription.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_usage(
        &self,
        subscription_id: SubscriptionId,
        limit: i64,
    ) -> Result<Vec<UsageCharge>, RepositoryError> {
        let rows = sqlx::query_as::<_, UsageChargeRow>(&format!(
            r"
            SELECT {USAGE_COLUMNS} FROM app.usage_charge
            WHERE subscription_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "
        ))
        .bind(subscription_id.as_i32())
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Every usage charge of a shop between two instants (reports).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn usage_for_shop_between(
        &self,
        shop_id: ShopId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<UsageCharge>, RepositoryError> {
        let rows = sqlx::query_as::<_, UsageChargeRow>(
            r"
            SELECT u.id, u.subscription_id, u.shopify_id, u.description, u.price,
                   u.currency_code, u.idempotency_key, u.created_at
            FROM app.usage_charge u
            JOIN app.subscription s ON s.id = u.subscription_id
            WHERE s.shop_id = $1 AND u.created_at >= $2 AND u.created_at < $3
            ORDER BY u.created_at
            ",
        )
        .bind(shop_id.as_i32())
        .bind(from)
        .bind(to)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

const LOCK_SUBSCRIPTION_SQL: &str = "SELECT id FROM app.subscription WHERE id = $1 FOR UPDATE";

const USAGE_BY_KEY_SQL: &str = "WHERE subscription_id = $1 AND idempotency_key = $2";

/// Usage writes on one subscription, serialized by its row lock.
///
/// Dropping the lock without [`UsageLock::commit`] rolls back.
pub struct UsageLock {
    tx: Transaction<'static, Postgres>,
    subscription_id: SubscriptionId,
}

impl UsageLock {
    /// Sum of usage charged since `since`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn total_since(&mut self, since: DateTime<Utc>) -> Result<Decimal, RepositoryError> {
        let total: Decimal = sqlx::query_scalar(
            r"
            SELECT COALESCE(SUM(price), 0)
            FROM app.usage_charge
            WHERE subscription_id = $1 AND created_at >= $2
            ",
        )
        .bind(self.subscription_id.as_i32())
        .bind(since)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(total)
    }

    /// Charge already recorded under `idempotency_key` on this subscription.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_key(
        &mut self,
        idempotency_key: &str,
    ) -> Result<Option<UsageCharge>, RepositoryError> {
        let row = sqlx::query_as::<_, UsageChargeRow>(&format!(
            "SELECT {USAGE_COLUMNS} FROM app.usage_charge {USAGE_BY_KEY_SQL}"
        ))
        .bind(self.subscription_id.as_i32())
        .bind(idempotency_key)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Persist a usage charge returned by the billing API.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the idempotency key was already
    /// used on this subscription.
    pub async fn insert(
        &mut self,
        shopify_id: &str,
        description: &str,
        price: Money,
        idempotency_key: &str,
    ) -> Result<UsageCharge, RepositoryError> {
        let row = sqlx::query_as::<_, UsageChargeRow>(&format!(
            r"
            INSERT INTO app.usage_charge (subscription_id, shopify_id, description, price,
                                          currency_code, idempotency_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USAGE_COLUMNS}
            "
        ))
        .bind(self.subscription_id.as_i32())
        .bind(shopify_id)
        .bind(description)
        .bind(price.amount)
        .bind(price.currency_code.as_str())
        .bind(idempotency_key)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| conflict_on_unique(e, "usage charge already recorded"))?;

        row.try_into()
    }

    /// Commit the writes and release the lock.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the commit fails.
    pub async fn commit(self) -> Result<(), RepositoryError> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BILLING_MIGRATION: &str = include_str!("../../migrations/20261001000002_create_billing.sql");

    #[test]
    fn test_idempotency_keys_are_scoped_to_the_subscription() {
        assert!(USAGE_BY_KEY_SQL.contains("subscription_id = $1"));
        assert!(USAGE_BY_KEY_SQL.contains("idempotency_key = $2"));
        assert!(BILLING_MIGRATION.contains("UNIQUE (subscription_id, idempotency_key)"));
        assert!(!BILLING_MIGRATION.contains("idempotency_key TEXT NOT NULL UNIQUE"));
    }

    #[test]
    fn test_usage_lock_takes_the_subscription_row() {
        assert!(LOCK_SUBSCRIPTION_SQL.starts_with("SELECT id FROM app.subscription"));
        assert!(LOCK_SUBSCRIPTION_SQL.ends_with("FOR UPDATE"));
    }
}
