//! Staff users seen through session tokens.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use storekeep_core::{ShopId, UserId};

use super::RepositoryError;
use crate::models::ShopUser;

#[derive(sqlx::FromRow)]
struct ShopUserRow {
    id: i32,
    shop_id: i32,
    shopify_user_id: i64,
    email: Option<String>,
    name: Option<String>,
    locale: Option<String>,
    account_owner: bool,
    last_seen_at: DateTime<Utc>,
}

impl From<ShopUserRow> for ShopUser {
    fn from(row: ShopUserRow) -> Self {
        Self {
            id: UserId::new(row.id),
            shop_id: ShopId::new(row.shop_id),
            shopify_user_id: row.shopify_user_id,
            email: row.email,
            name: row.name,
            locale: row.locale,
            account_owner: row.account_owner,
            last_seen_at: row.last_seen_at,
        }
    }
}

/// Repository for shop staff users.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Record that a staff user made a request, creating the row on first sight.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn touch(
        &self,
        shop_id: ShopId,
        shopify_user_id: i64,
    ) -> Result<ShopUser, RepositoryError> {
        let row = sqlx::query_as::<_, ShopUserRow>(
            r"
            INSERT INTO app.shop_user (shop_id, shopify_user_id)
            VALUES ($1, $2)
            ON CONFLICT (shop_id, shopify_user_id) DO UPDATE SET last_seen_at = NOW()
            RETURNING id, shop_id, shopify_user_id, email, name, locale, account_owner, last_seen_at
            ",
        )
        .bind(shop_id.as_i32())
        .bind(shopify_user_id)
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }
}
