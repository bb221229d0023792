//! Installed shop repository.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use storekeep_core::{CurrencyCode, Email, ShopDomain, ShopId};

use super::RepositoryError;
use crate::models::Shop;

const SHOP_COLUMNS: &str = "id, domain, name, email, currency_code, access_token, scopes, \
     installed_at, uninstalled_at, created_at, updated_at";

/// Internal row type for `PostgreSQL` shop queries.
#[derive(sqlx::FromRow)]
struct ShopRow {
    id: i32,
    domain: String,
    name: Option<String>,
    email: Option<String>,
    currency_code: String,
    access_token: Option<String>,
    scopes: String,
    installed_at: DateTime<Utc>,
    uninstalled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ShopRow> for Shop {
    type Error = RepositoryError;

    fn try_from(row: ShopRow) -> Result<Self, Self::Error> {
        let domain = ShopDomain::parse(&row.domain).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid shop domain in database: {e}"))
        })?;
        let currency_code: CurrencyCode = row.currency_code.parse().map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid currency in database: {e}"))
        })?;
        // Contact emails come from the platform; a malformed one is dropped, not fatal.
        let email = row.email.as_deref().and_then(|e| Email::parse(e).ok());
        let scopes = row
            .scopes
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            id: ShopId::new(row.id),
            domain,
            name: row.name,
            email,
            currency_code,
            access_token: row.access_token.map(SecretString::from),
            scopes,
            installed_at: row.installed_at,
            uninstalled_at: row.uninstalled_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Repository for installed shops.
pub struct ShopRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ShopRepository<'a> {
    /// Create a new shop repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a shop by domain, installed or not.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_domain(&self, domain: &ShopDomain) -> Result<Option<Shop>, RepositoryError> {
        let row = sqlx::query_as::<_, ShopRow>(&format!(
            "SELECT {SHOP_COLUMNS} FROM app.shop WHERE domain = $1"
        ))
        .bind(domain.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Get a shop by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ShopId) -> Result<Option<Shop>, RepositoryError> {
        let row = sqlx::query_as::<_, ShopRow>(&format!(
            "SELECT {SHOP_COLUMNS} FROM app.shop WHERE id = $1"
        ))
        .bind(id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Store the offline token for a shop, reinstalling it if it was uninstalled.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert_installed(
        &self,
        domain: &ShopDomain,
        access_token: &SecretString,
        scopes: &[String],
    ) -> Result<Shop, RepositoryError> {
        let row = sqlx::query_as::<_, ShopRow>(&format!(
            r"
            INSERT INTO app.shop (domain, access_token, scopes)
            VALUES ($1, $2, $3)
            ON CONFLICT (domain) DO UPDATE SET
                access_token = EXCLUDED.access_token,
                scopes = EXCLUDED.scopes,
                installed_at = CASE
                    WHEN app.shop.uninstalled_at IS NOT NULL THEN NOW()
                    ELSE app.shop.installed_at
                END,
                uninstalled_at = NULL
            RETURNING {SHOP_COLUMNS}
            "
        ))
        .bind(domain.as_str())
        .bind(access_token.expose_secret())
        .bind(scopes.join(","))
        .fetch_one(self.pool)
        .await?;

        row.try_into()
    }

    /// Save the shop details fetched from the Admin API after install.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the shop doesn't exist.
    pub async fn update_details(
        &self,
        id: ShopId,
        name: &str,
        email: Option<&Email>,
        currency_code: CurrencyCode,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE app.shop SET name = $1, email = $2, currency_code = $3 WHERE id = $4",
        )
        .bind(name)
        .bind(email.map(Email::as_str))
        .bind(currency_code.as_str())
        .bind(id.as_i32())
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Soft-delete a shop: clear its token and stamp `uninstalled_at`.
    ///
    /// Returns the shop ID when a row was updated.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn mark_uninstalled(
        &self,
        domain: &ShopDomain,
    ) -> Result<Option<ShopId>, RepositoryError> {
        let id: Option<i32> = sqlx::query_scalar(
            r"
            UPDATE app.shop
            SET access_token = NULL, uninstalled_at = COALESCE(uninstalled_at, NOW())
            WHERE domain = $1
            RETURNING id
            ",
        )
        .bind(domain.as_str())
        .fetch_optional(self.pool)
        .await?;

        Ok(id.map(ShopId::new))
    }

    /// Delete a shop and, through cascades, every row that belongs to it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete_by_domain(&self, domain: &ShopDomain) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM app.shop WHERE domain = $1")
            .bind(domain.as_str())
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
