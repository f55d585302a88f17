use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use hashdrop_core::{ContentDigest, HashdropError};
use serde::Serialize;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::debug;

use crate::error::ServerError;
use crate::state::AppState;

const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub digest: ContentDigest,
    pub filename: String,
    pub size_bytes: u64,
    pub deduplicated: bool,
    pub link: String,
}

#[derive(Debug, Serialize)]
pub struct BrowseItem {
    pub filename: String,
    pub size_bytes: u64,
    pub digest: ContentDigest,
    pub created_at: DateTime<Utc>,
    pub link: String,
}

fn file_link(digest: &ContentDigest) -> String {
    format!("/file/{digest}")
}

/// POST /upload: stream the multipart `file` field into the vault.
///
/// Other fields (such as the `md5` some clients still send) are skipped.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ServerError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some(FILE_FIELD) {
            debug!(field = ?field.name(), "ignoring multipart field");
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let stream = field.map_err(std::io::Error::other);
        let reader = Box::pin(StreamReader::new(stream));

        let receipt = match state.vault().upload(&filename, reader).await {
            Ok(r) => r,
            Err(HashdropError::EmptyUpload) => {
                return Err(ServerError::BadRequest("no file uploaded".into()));
            }
            Err(e) => return Err(ServerError::Internal(format!("upload failed: {e}"))),
        };

        return Ok(Json(UploadResponse {
            link: file_link(&receipt.digest),
            digest: receipt.digest,
            filename: receipt.filename,
            size_bytes: receipt.size_bytes,
            deduplicated: receipt.deduplicated,
        }));
    }

    Err(ServerError::BadRequest("no file uploaded".into()))
}

/// GET /browse: every stored file, newest first.
pub async fn browse(State(state): State<AppState>) -> Result<Json<Vec<BrowseItem>>, ServerError> {
    let listings = state.vault().list_all().await?;
    let items = listings
        .into_iter()
        .map(|l| BrowseItem {
            link: file_link(&l.digest),
            filename: l.filename,
            size_bytes: l.size_bytes,
            digest: l.digest,
            created_at: l.created_at,
        })
        .collect();
    Ok(Json(items))
}

/// GET /file/{digest}: stream the stored bytes back as an attachment.
pub async fn download(
    State(state): State<AppState>,
    Path(digest): Path<String>,
) -> Result<Response, ServerError> {
    let digest: ContentDigest = digest.parse()?;
    let resolved = state.vault().resolve(&digest).await?;

    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (header::CONTENT_LENGTH, resolved.size_bytes.to_string()),
        (
            header::CONTENT_DISPOSITION,
            content_disposition(&resolved.filename),
        ),
    ];
    let body = Body::from_stream(ReaderStream::new(resolved.reader));
    Ok((StatusCode::OK, headers, body).into_response())
}

/// `attachment` disposition with an ASCII fallback name plus the exact
/// name in RFC 5987 form.
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() || c == ' ') && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut encoded = String::with_capacity(filename.len());
    for b in filename.bytes() {
        if b.is_ascii_alphanumeric() || b"-._~".contains(&b) {
            encoded.push(char::from(b));
        } else {
            encoded.push_str(&format!("%{b:02X}"));
        }
    }

    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}
