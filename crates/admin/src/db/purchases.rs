//! One-time purchase repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use storekeep_core::{Money, OneTimePurchaseId, PurchaseStatus, ShopId};

use super::{RepositoryError, conflict_on_unique, money};
use crate::models::OneTimePurchase;

const PURCHASE_COLUMNS: &str =
    "id, shop_id, shopify_id, name, price, currency_code, status, test, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct PurchaseRow {
    id: i32,
    shop_id: i32,
    shopify_id: String,
    name: String,
    price: Decimal,
    currency_code: String,
    status: PurchaseStatus,
    test: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PurchaseRow> for OneTimePurchase {
    type Error = RepositoryError;

    fn try_from(row: PurchaseRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: OneTimePurchaseId::new(row.id),
            shop_id: ShopId::new(row.shop_id),
            shopify_id: row.shopify_id,
            name: row.name,
            price: money(row.price, &row.currency_code)?,
            status: row.status,
            test: row.test,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Repository for one-time purchases.
pub struct PurchaseRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PurchaseRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Persist a pending purchase.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the remote ID is already stored.
    pub async fn create(
        &self,
        shop_id: ShopId,
        shopify_id: &str,
        name: &str,
        price: Money,
        test: bool,
    ) -> Result<OneTimePurchase, RepositoryError> {
        let row = sqlx::query_as::<_, PurchaseRow>(&format!(
            r"
            INSERT INTO app.one_time_purchase (shop_id, shopify_id, name, price, currency_code, test)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PURCHASE_COLUMNS}
            "
        ))
        .bind(shop_id.as_i32())
        .bind(shopify_id)
        .bind(name)
        .bind(price.amount)
        .bind(price.currency_code.as_str())
        .bind(test)
        .fetch_one(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "purchase already recorded"))?;

        row.try_into()
    }

    /// Look up a shop's purchase by remote GID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_shopify_id(
        &self,
        shop_id: ShopId,
        shopify_id: &str,
    ) -> Result<Option<OneTimePurchase>, RepositoryError> {
        let row = sqlx::query_as::<_, PurchaseRow>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM app.one_time_purchase WHERE shop_id = $1 AND shopify_id = $2"
        ))
        .bind(shop_id.as_i32())
        .bind(shopify_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the purchase doesn't exist.
    pub async fn set_status(
        &self,
        id: OneTimePurchaseId,
        status: PurchaseStatus,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE app.one_time_purchase SET status = $1 WHERE id = $2")
            .bind(status)
            .bind(id.as_i32())
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// A shop's purchases, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_shop(
        &self,
        shop_id: ShopId,
    ) -> Result<Vec<OneTimePurchase>, RepositoryError> {
        let rows = sqlx::query_as::<_, PurchaseRow>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM app.one_time_purchase WHERE shop_id = $1 ORDER BY created_at DESC"
        ))
        .bind(shop_id.as_i32())
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}
