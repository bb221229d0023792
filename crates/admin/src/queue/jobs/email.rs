//! Send a notification email.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use storekeep_core::{Email, JobKind};
use uuid::Uuid;

use crate::db::FileRepository;
use crate::models::Job;
use crate::queue::{JobError, JobHandler, JobPayload, decode};
use crate::services::{EmailAttachment, EmailError, EmailMessage};
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailJob {
    pub to: Email,
    pub message: EmailMessage,
    /// Stored file of the job's shop to attach.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Uuid>,
}

impl JobPayload for EmailJob {
    const KIND: JobKind = JobKind::Email;
}

pub struct EmailHandler;

#[async_trait]
impl JobHandler for EmailHandler {
    fn kind(&self) -> JobKind {
        JobKind::Email
    }

    async fn handle(&self, job: &Job, state: &AppState) -> Result<(), JobError> {
        let payload: EmailJob = decode(job)?;
        let mailer = state.email().ok_or(EmailError::NotConfigured)?;

        let attachment = match payload.attachment {
            Some(file_id) => {
                let shop_id = job
                    .shop_id
                    .ok_or_else(|| JobError::Permanent("attachment without a shop".to_string()))?;
                let file = FileRepository::new(state.pool())
                    .get_for_shop(file_id, shop_id)
                    .await?
                    .ok_or_else(|| JobError::Permanent(format!("attachment {file_id} is gone")))?;
                let body = state.files().read(&file).await?;
                Some(EmailAttachment {
                    filename: file.filename,
                    content_type: file.content_type,
                    body,
                })
            }
            None => None,
        };

        mailer
            .send(payload.to.as_str(), &payload.message, attachment)
            .await?;
        tracing::info!(to = %payload.to.masked(), job_id = %job.id, "Email sent");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let job = EmailJob {
            to: Email::parse("owner@cool-shop.com").unwrap(),
            message: EmailMessage::Welcome {
                shop_name: "Cool Shop".to_string(),
                admin_url: "https://admin.shopify.com/store/cool-shop/apps/key".to_string(),
            },
            attachment: None,
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["to"], "owner@cool-shop.com");
        assert_eq!(json["message"]["template"], "welcome");
        assert!(json.get("attachment").is_none());

        let decoded: EmailJob = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, job);
    }
}
