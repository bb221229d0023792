//! Uploaded file metadata.

use chrono::{DateTime, Utc};
use storekeep_core::ShopId;
use uuid::Uuid;

/// A file uploaded by a merchant and kept in local storage.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub id: Uuid,
    pub shop_id: ShopId,
    pub filename: String,
    pub content_type: String,
    pub byte_size: i64,
    /// Path relative to the upload root (`<shop_id>/<uuid>`).
    pub storage_key: String,
    /// GID of the platform file once pushed by an image job.
    pub shopify_file_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StoredFile {
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}
