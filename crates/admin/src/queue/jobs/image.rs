//! Push an uploaded image to the shop's Files.
//!
//! Staged upload first, then `fileCreate` with the staged resource URL.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use storekeep_core::JobKind;
use tracing::info;
use uuid::Uuid;

use crate::db::FileRepository;
use crate::models::Job;
use crate::queue::{JobError, JobHandler, JobPayload, decode, shop_client};
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageJob {
    pub file_id: Uuid,
    #[serde(default)]
    pub alt: Option<String>,
}

impl JobPayload for ImageJob {
    const KIND: JobKind = JobKind::Image;
}

pub struct ImageHandler;

#[async_trait]
impl JobHandler for ImageHandler {
    fn kind(&self) -> JobKind {
        JobKind::Image
    }

    async fn handle(&self, job: &Job, state: &AppState) -> Result<(), JobError> {
        let payload: ImageJob = decode(job)?;
        let (shop, client) = shop_client(state, job).await?;
        let files = FileRepository::new(state.pool());

        let file = files
            .get_for_shop(payload.file_id, shop.id)
            .await?
            .ok_or_else(|| JobError::Permanent(format!("file {} is gone", payload.file_id)))?;

        if let Some(existing) = &file.shopify_file_id {
            info!(file = %file.id, shopify_file = %existing, "Image already pushed");
            return Ok(());
        }
        if !file.is_image() {
            return Err(JobError::Permanent(format!(
                "{} is not an image",
                file.content_type
            )));
        }

        let bytes = state.files().read(&file).await?;
        let byte_size = u64::try_from(bytes.len()).unwrap_or(u64::MAX);

        let target = client
            .create_staged_upload(&file.filename, &file.content_type, byte_size)
            .await?;
        client
            .upload_to_staged_target(&target, &file.filename, &file.content_type, bytes)
            .await?;
        let created = client
            .create_file(&target.resource_url, &file.content_type, payload.alt)
            .await?;

        files.set_shopify_file_id(file.id, &created.id).await?;
        info!(file = %file.id, shopify_file = %created.id, status = %created.file_status, "Image pushed to Files");
        Ok(())
    }
}
