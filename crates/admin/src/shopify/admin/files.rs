//! Staged uploads and file records in Shopify Files.

use tracing::instrument;

use super::{
    AdminClient, AdminShopifyError, check_user_errors, missing,
    queries::files::{
        FileCreate, FileCreateInput, FileCreateVariables, StagedUploadInput, StagedUploadsCreate,
        StagedUploadsCreateVariables,
    },
};
use crate::shopify::types::{CreatedFile, StagedUploadTarget};

/// The `FileContentType` / `StagedUploadTargetGenerateUploadResource` for a MIME type.
fn resource_for(content_type: &str) -> &'static str {
    if content_type.starts_with("image/") {
        "IMAGE"
    } else {
        "FILE"
    }
}

impl AdminClient {
    /// Create a staged upload target for a file.
    ///
    /// # Errors
    ///
    /// Returns `UserErrors` or an API error.
    #[instrument(skip(self))]
    pub async fn create_staged_upload(
        &self,
        filename: &str,
        content_type: &str,
        byte_size: u64,
    ) -> Result<StagedUploadTarget, AdminShopifyError> {
        let variables = StagedUploadsCreateVariables {
            input: vec![StagedUploadInput {
                filename: filename.to_string(),
                mime_type: content_type.to_string(),
                http_method: "POST",
                resource: resource_for(content_type),
                file_size: byte_size.to_string(),
            }],
        };

        let payload = self
            .execute::<StagedUploadsCreate>(variables)
            .await?
            .staged_uploads_create
            .ok_or_else(|| missing("No payload returned from stagedUploadsCreate"))?;
        check_user_errors(payload.user_errors)?;

        let target = payload
            .staged_targets
            .and_then(|targets| targets.into_iter().next())
            .ok_or_else(|| missing("No staged upload target returned"))?;

        match (target.url, target.resource_url) {
            (Some(url), Some(resource_url)) => Ok(StagedUploadTarget {
                url,
                resource_url,
                parameters: target
                    .parameters
                    .into_iter()
                    .map(|p| (p.name, p.value))
                    .collect(),
            }),
            _ => Err(missing("Staged upload target is missing its URL")),
        }
    }

    /// Upload bytes to a staged target with a multipart POST.
    ///
    /// The target's form parameters must precede the file part.
    ///
    /// # Errors
    ///
    /// Returns an HTTP error if the upload is rejected.
    #[instrument(skip(self, target, bytes), fields(size = bytes.len()))]
    pub async fn upload_to_staged_target(
        &self,
        target: &StagedUploadTarget,
        filename: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), AdminShopifyError> {
        let mut form = reqwest::multipart::Form::new();
        for (name, value) in &target.parameters {
            form = form.text(name.clone(), value.clone());
        }
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(content_type)?;
        form = form.part("file", part);

        self.http()
            .post(&target.url)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Register an uploaded staged file in Shopify Files.
    ///
    /// # Errors
    ///
    /// Returns `UserErrors` or an API error.
    #[instrument(skip(self))]
    pub async fn create_file(
        &self,
        resource_url: &str,
        content_type: &str,
        alt: Option<String>,
    ) -> Result<CreatedFile, AdminShopifyError> {
        let variables = FileCreateVariables {
            files: vec![FileCreateInput {
                original_source: resource_url.to_string(),
                content_type: resource_for(content_type),
                alt,
            }],
        };

        let payload = self
            .execute::<FileCreate>(variables)
            .await?
            .file_create
            .ok_or_else(|| missing("No payload returned from fileCreate"))?;
        check_user_errors(payload.user_errors)?;

        payload
            .files
            .and_then(|files| files.into_iter().next())
            .map(|f| CreatedFile {
                id: f.id,
                file_status: f.file_status,
            })
            .ok_or_else(|| missing("No file returned from fileCreate"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_for() {
        assert_eq!(resource_for("image/png"), "IMAGE");
        assert_eq!(resource_for("application/pdf"), "FILE");
        assert_eq!(resource_for("text/csv"), "FILE");
    }
}
