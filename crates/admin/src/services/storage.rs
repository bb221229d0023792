//! Local storage for merchant uploads and generated reports.
//!
//! Files live under `UPLOAD_DIR/<shop_id>/<uuid>`; metadata is in
//! `app.stored_file` and every read is scoped to the owning shop.

use std::path::{Path, PathBuf};

use sqlx::PgPool;
use storekeep_core::ShopId;
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::db::{FileRepository, RepositoryError};
use crate::models::StoredFile;

/// Content types accepted for upload.
pub const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/webp",
    "application/pdf",
    "text/csv",
    "text/plain",
];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("File is larger than the {max_bytes} byte limit.")]
    TooLarge { max_bytes: u64 },

    #[error("Files of type {0} can't be uploaded.")]
    UnsupportedType(String),

    #[error("The uploaded file is empty.")]
    Empty,
}

impl StorageError {
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::TooLarge { .. } | Self::UnsupportedType(_) | Self::Empty
        )
    }
}

/// Strip parameters and normalise case (`Text/CSV; charset=utf-8` → `text/csv`).
#[must_use]
pub fn normalize_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Keep only the final path component of a client-supplied filename.
#[must_use]
pub fn sanitize_filename(filename: &str) -> String {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>();
    if name.is_empty() || name == "." || name == ".." {
        "upload".to_string()
    } else {
        name
    }
}

/// Storage key of a file: `<shop_id>/<uuid>`.
#[must_use]
pub fn storage_key(shop_id: ShopId, id: Uuid) -> String {
    format!("{shop_id}/{id}")
}

/// Upload storage rooted at `UPLOAD_DIR`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    max_bytes: u64,
}

impl FileStore {
    #[must_use]
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            root: config.dir.clone(),
            max_bytes: config.max_bytes,
        }
    }

    #[must_use]
    pub const fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Check type and size before anything is written.
    ///
    /// # Errors
    ///
    /// Returns `Empty`, `TooLarge` or `UnsupportedType`.
    pub fn check(&self, content_type: &str, byte_size: u64) -> Result<(), StorageError> {
        if byte_size == 0 {
            return Err(StorageError::Empty);
        }
        if byte_size > self.max_bytes {
            return Err(StorageError::TooLarge {
                max_bytes: self.max_bytes,
            });
        }
        if !ALLOWED_CONTENT_TYPES.contains(&content_type) {
            return Err(StorageError::UnsupportedType(content_type.to_string()));
        }
        Ok(())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn shop_dir(&self, shop_id: ShopId) -> PathBuf {
        self.root.join(shop_id.to_string())
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    /// Store bytes and record their metadata.
    ///
    /// # Errors
    ///
    /// Returns a validation error, or an error if the write or insert fails.
    #[instrument(skip(self, pool, bytes), fields(size = bytes.len()))]
    pub async fn save(
        &self,
        pool: &PgPool,
        shop_id: ShopId,
        filename: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<StoredFile, StorageError> {
        let content_type = normalize_content_type(content_type);
        let byte_size = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        self.check(&content_type, byte_size)?;

        let id = Uuid::new_v4();
        let key = storage_key(shop_id, id);
        self.write(&key, bytes).await?;

        let stored = FileRepository::new(pool)
            .create(
                id,
                shop_id,
                &sanitize_filename(filename),
                &content_type,
                i64::try_from(bytes.len()).unwrap_or(i64::MAX),
                &key,
            )
            .await;

        match stored {
            Ok(file) => {
                info!(file = %file.id, content_type = %file.content_type, "File stored");
                Ok(file)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(self.path_for(&key)).await;
                Err(e.into())
            }
        }
    }

    /// Read a stored file's bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing on disk.
    pub async fn read(&self, file: &StoredFile) -> Result<Vec<u8>, StorageError> {
        Ok(tokio::fs::read(self.path_for(&file.storage_key)).await?)
    }

    /// Remove every stored file of a shop (`shop/redact`).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but can't be removed.
    pub async fn delete_shop(&self, shop_id: ShopId) -> Result<(), StorageError> {
        let dir = self.shop_dir(shop_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!(dir = %dir.display(), "Removed shop uploads");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn store(max_bytes: u64) -> FileStore {
        FileStore::new(&UploadConfig {
            dir: std::env::temp_dir().join(format!("storekeep-test-{}", Uuid::new_v4())),
            max_bytes,
        })
    }

    #[test]
    fn test_check_rules() {
        let store = store(10);
        assert!(store.check("image/png", 10).is_ok());
        assert!(matches!(store.check("image/png", 0), Err(StorageError::Empty)));
        assert!(matches!(
            store.check("image/png", 11),
            Err(StorageError::TooLarge { max_bytes: 10 })
        ));
        assert!(matches!(
            store.check("application/x-msdownload", 5),
            Err(StorageError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_normalize_content_type() {
        assert_eq!(normalize_content_type("Text/CSV; charset=utf-8"), "text/csv");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\logo.png"), "logo.png");
        assert_eq!(sanitize_filename(".."), "upload");
        assert_eq!(sanitize_filename(""), "upload");
    }

    #[test]
    fn test_storage_key() {
        let id = Uuid::nil();
        assert_eq!(
            storage_key(ShopId::new(7), id),
            "7/00000000-0000-0000-0000-000000000000"
        );
    }

    #[tokio::test]
    async fn test_write_and_delete_shop() {
        let store = store(1024);
        let key = storage_key(ShopId::new(3), Uuid::new_v4());
        store.write(&key, b"hello").await.unwrap();
        assert_eq!(tokio::fs::read(store.path_for(&key)).await.unwrap(), b"hello");

        store.delete_shop(ShopId::new(3)).await.unwrap();
        assert!(!store.path_for(&key).exists());
        // already gone
        store.delete_shop(ShopId::new(3)).await.unwrap();
        let _ = tokio::fs::remove_dir_all(store.root()).await;
    }
}
