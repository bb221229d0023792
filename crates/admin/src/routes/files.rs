//! File upload and download.
//!
//! Uploads stream into memory up to the configured limit; anything larger is
//! rejected before the rest of the body is read.

use std::time::Duration;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tracing::instrument;
use uuid::Uuid;

use super::{NoticeQuery, PageContext, format_datetime};
use crate::db::FileRepository;
use crate::error::AppError;
use crate::filters;
use crate::middleware::ShopSession;
use crate::models::StoredFile;
use crate::queue::ImageJob;
use crate::services::StorageError;
use crate::state::AppState;

const FILES_PAGE_LIMIT: i64 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/files",
            get(index).post(upload).layer(DefaultBodyLimit::disable()),
        )
        .route("/files/{id}", get(download))
}

/// Stored file view for templates.
#[derive(Debug, Clone)]
pub struct FileView {
    pub id: String,
    pub filename: String,
    pub content_type: String,
    pub size: String,
    pub created_at: String,
    pub in_shopify: bool,
}

impl From<&StoredFile> for FileView {
    fn from(f: &StoredFile) -> Self {
        Self {
            id: f.id.to_string(),
            filename: f.filename.clone(),
            content_type: f.content_type.clone(),
            size: filters::human_size(u64::try_from(f.byte_size).unwrap_or(0)),
            created_at: format_datetime(f.created_at),
            in_shopify: f.shopify_file_id.is_some(),
        }
    }
}

/// Files page template.
#[derive(Template, WebTemplate)]
#[template(path = "files/index.html")]
pub struct FilesTemplate {
    pub page: PageContext,
    pub files: Vec<FileView>,
    pub max_size: String,
}

async fn files_page(
    state: &AppState,
    session: &ShopSession,
    page: PageContext,
) -> Result<FilesTemplate, AppError> {
    let files = FileRepository::new(state.pool())
        .list_for_shop(session.shop.id, FILES_PAGE_LIMIT)
        .await?;
    Ok(FilesTemplate {
        page,
        files: files.iter().map(FileView::from).collect(),
        max_size: filters::human_size(state.files().max_bytes()),
    })
}

/// GET /files - Uploads and generated reports.
#[instrument(skip(session, state), fields(shop = %session.shop.domain))]
async fn index(
    session: ShopSession,
    State(state): State<AppState>,
    Query(notice): Query<NoticeQuery>,
) -> Result<FilesTemplate, AppError> {
    let page = PageContext::new(&state, &session, "/files").with_notice(&notice);
    files_page(&state, &session, page).await
}

/// A file part read from the multipart body.
struct Upload {
    filename: String,
    content_type: String,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct UploadForm {
    file: Option<Upload>,
    alt: Option<String>,
    send_to_shopify: bool,
}

async fn read_form(mut multipart: Multipart, max_bytes: u64) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();
    let bad_request = |e: axum::extract::multipart::MultipartError| AppError::BadRequest(e.body_text());

    while let Some(mut field) = multipart.next_field().await.map_err(bad_request)? {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let mut bytes = Vec::new();
                while let Some(chunk) = field.chunk().await.map_err(bad_request)? {
                    bytes.extend_from_slice(&chunk);
                    if u64::try_from(bytes.len()).unwrap_or(u64::MAX) > max_bytes {
                        return Err(StorageError::TooLarge { max_bytes }.into());
                    }
                }
                form.file = Some(Upload {
                    filename,
                    content_type,
                    bytes,
                });
            }
            Some("alt") => {
                let alt = field.text().await.map_err(bad_request)?;
                form.alt = Some(alt.trim().to_string()).filter(|a| !a.is_empty());
            }
            Some("send_to_shopify") => {
                form.send_to_shopify = !field.text().await.map_err(bad_request)?.is_empty();
            }
            _ => {}
        }
    }

    Ok(form)
}

/// POST /files - Upload a file (multipart).
#[instrument(skip(session, state, multipart), fields(shop = %session.shop.domain))]
async fn upload(
    session: ShopSession,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let form = match read_form(multipart, state.files().max_bytes()).await {
        Ok(form) => form,
        Err(AppError::Storage(e)) if e.is_client_error() => {
            let page = PageContext::new(&state, &session, "/files").with_error(e.to_string());
            return Ok(files_page(&state, &session, page).await?.into_response());
        }
        Err(e) => return Err(e),
    };

    let Some(upload) = form.file else {
        let page = PageContext::new(&state, &session, "/files").with_error("Choose a file to upload.");
        return Ok(files_page(&state, &session, page).await?.into_response());
    };

    let stored = match state
        .files()
        .save(
            state.pool(),
            session.shop.id,
            &upload.filename,
            &upload.content_type,
            &upload.bytes,
        )
        .await
    {
        Ok(stored) => stored,
        Err(e) if e.is_client_error() => {
            let page = PageContext::new(&state, &session, "/files").with_error(e.to_string());
            return Ok(files_page(&state, &session, page).await?.into_response());
        }
        Err(e) => return Err(e.into()),
    };

    if form.send_to_shopify && stored.is_image() {
        let job = ImageJob {
            file_id: stored.id,
            alt: form.alt,
        };
        state
            .queue()
            .enqueue(Some(session.shop.id), &job, Duration::ZERO)
            .await?;
        return Ok(session.redirect("/files?success=image_queued").into_response());
    }

    Ok(session.redirect("/files?success=uploaded").into_response())
}

/// `Content-Disposition` for a download, ASCII-only with quotes stripped.
fn content_disposition(filename: &str) -> HeaderValue {
    let safe: String = filename
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .filter(|c| *c != '"' && *c != '\\')
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{safe}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// GET /files/{id} - Download a file owned by the shop.
#[instrument(skip(session, state), fields(shop = %session.shop.domain))]
async fn download(
    session: ShopSession,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let file = FileRepository::new(state.pool())
        .get_for_shop(id, session.shop.id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("file {id}")))?;

    let bytes = state.files().read(&file).await?;
    let content_type = HeaderValue::from_str(&file.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, content_disposition(&file.filename)),
            (header::CACHE_CONTROL, HeaderValue::from_static("private, no-store")),
        ],
        Body::from(bytes),
    )
        .into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_strips_quotes() {
        let value = content_disposition("re\"port\u{e9}.csv");
        assert_eq!(value, "attachment; filename=\"report_.csv\"");
    }
}
