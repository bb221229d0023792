//! Staged uploads and file records.

use serde::{Deserialize, Serialize};

use super::operation;
use crate::shopify::types::UserError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedUploadInput {
    pub filename: String,
    pub mime_type: String,
    pub http_method: &'static str,
    pub resource: &'static str,
    pub file_size: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StagedUploadsCreateVariables {
    pub input: Vec<StagedUploadInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StagedUploadParameter {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedTarget {
    pub url: Option<String>,
    pub resource_url: Option<String>,
    #[serde(default)]
    pub parameters: Vec<StagedUploadParameter>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedUploadsCreatePayload {
    #[serde(default)]
    pub staged_targets: Option<Vec<StagedTarget>>,
    #[serde(default)]
    pub user_errors: Vec<UserError>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedUploadsCreateData {
    pub staged_uploads_create: Option<StagedUploadsCreatePayload>,
}

operation!(
    StagedUploadsCreate,
    "StagedUploadsCreate",
    StagedUploadsCreateVariables,
    StagedUploadsCreateData,
    r"mutation StagedUploadsCreate($input: [StagedUploadInput!]!) {
  stagedUploadsCreate(input: $input) {
    stagedTargets { url resourceUrl parameters { name value } }
    userErrors { field message }
  }
}"
);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCreateInput {
    pub original_source: String,
    pub content_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileCreateVariables {
    pub files: Vec<FileCreateInput>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    pub id: String,
    pub file_status: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCreatePayload {
    #[serde(default)]
    pub files: Option<Vec<FileNode>>,
    #[serde(default)]
    pub user_errors: Vec<UserError>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCreateData {
    pub file_create: Option<FileCreatePayload>,
}

operation!(
    FileCreate,
    "FileCreate",
    FileCreateVariables,
    FileCreateData,
    r"mutation FileCreate($files: [FileCreateInput!]!) {
  fileCreate(files: $files) {
    files { id fileStatus }
    userErrors { field message code }
  }
}"
);
