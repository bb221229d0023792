//! Uploaded file metadata repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use storekeep_core::ShopId;
use uuid::Uuid;

use super::RepositoryError;
use crate::models::StoredFile;

const FILE_COLUMNS: &str =
    "id, shop_id, filename, content_type, byte_size, storage_key, shopify_file_id, created_at";

#[derive(sqlx::FromRow)]
struct StoredFileRow {
    id: Uuid,
    shop_id: i32,
    filename: String,
    content_type: String,
    byte_size: i64,
    storage_key: String,
    shopify_file_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<StoredFileRow> for StoredFile {
    fn from(row: StoredFileRow) -> Self {
        Self {
            id: row.id,
            shop_id: ShopId::new(row.shop_id),
            filename: row.filename,
            content_type: row.content_type,
            byte_size: row.byte_size,
            storage_key: row.storage_key,
            shopify_file_id: row.shopify_file_id,
            created_at: row.created_at,
        }
    }
}

/// Repository for stored file metadata.
pub struct FileRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> FileRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create(
        &self,
        id: Uuid,
        shop_id: ShopId,
        filename: &str,
        content_type: &str,
        byte_size: i64,
        storage_key: &str,
    ) -> Result<StoredFile, RepositoryError> {
        let row = sqlx::query_as::<_, StoredFileRow>(&format!(
            r"
            INSERT INTO app.stored_file (id, shop_id, filename, content_type, byte_size, storage_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {FILE_COLUMNS}
            "
        ))
        .bind(id)
        .bind(shop_id.as_i32())
        .bind(filename)
        .bind(content_type)
        .bind(byte_size)
        .bind(storage_key)
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }

    /// Get a file that belongs to `shop_id`.
    ///
    /// Files of other shops are reported as missing.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_for_shop(
        &self,
        id: Uuid,
        shop_id: ShopId,
    ) -> Result<Option<StoredFile>, RepositoryError> {
        let row = sqlx::query_as::<_, StoredFileRow>(&format!(
            "SELECT {FILE_COLUMNS} FROM app.stored_file WHERE id = $1 AND shop_id = $2"
        ))
        .bind(id)
        .bind(shop_id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Most recent uploads of a shop.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_shop(
        &self,
        shop_id: ShopId,
        limit: i64,
    ) -> Result<Vec<StoredFile>, RepositoryError> {
        let rows = sqlx::query_as::<_, StoredFileRow>(&format!(
            "SELECT {FILE_COLUMNS} FROM app.stored_file WHERE shop_id = $1 ORDER BY created_at DESC LIMIT $2"
        ))
        .bind(shop_id.as_i32())
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Remember the platform file created from this upload.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the file doesn't exist.
    pub async fn set_shopify_file_id(
        &self,
        id: Uuid,
        shopify_file_id: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE app.stored_file SET shopify_file_id = $1 WHERE id = $2")
            .bind(shopify_file_id)
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
