//! Staged upload and file types.

/// A staged upload target created by `stagedUploadsCreate`.
#[derive(Debug, Clone)]
pub struct StagedUploadTarget {
    /// URL to POST the multipart form to.
    pub url: String,
    /// URL to pass as `originalSource` to `fileCreate`.
    pub resource_url: String,
    /// Form fields to send before the file part.
    pub parameters: Vec<(String, String)>,
}

/// A file created in the shop's Files.
#[derive(Debug, Clone)]
pub struct CreatedFile {
    pub id: String,
    pub file_status: String,
}
