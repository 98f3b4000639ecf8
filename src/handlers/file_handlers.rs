//! HTTP handlers for asset upload, listing, download and deletion.
//! Validation happens here; persistence is delegated to the configured
//! `FileStore`.

use crate::{
    AppState,
    errors::AppError,
    models::stored_file::{DownloadedFile, FileSummary, NewFile, StoredFile},
    validation::validate_upload,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose};
use tracing::info;

/// Multipart field carrying the uploaded asset.
pub const FILE_FIELD: &str = "file";

/// `GET /files` — metadata of every stored asset, newest first.
pub async fn list_files(State(state): State<AppState>) -> Result<Json<Vec<FileSummary>>, AppError> {
    let files = state.store.list().await?;
    Ok(Json(files.into_iter().map(FileSummary::from).collect()))
}

/// `POST /files` — multipart upload of a single asset in the `file` field.
///
/// Other fields are ignored. Only the first `file` field is stored.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let name = field.file_name().unwrap_or_default().to_string();
        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_default();
        let content = field.bytes().await?;

        validate_upload(&name, content.len() as u64, state.max_file_size_bytes)?;

        let stored = state
            .store
            .save(NewFile {
                name,
                content_type,
                content,
            })
            .await?;
        info!(id = %stored.id, backend = %state.store.backend(), "upload complete");
        return Ok((StatusCode::CREATED, Json(stored)));
    }

    Err(AppError::bad_request(format!(
        "multipart field `{}` is missing",
        FILE_FIELD
    )))
}

/// `GET /files/{id}` — metadata for one asset.
pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FileSummary>, AppError> {
    let file: StoredFile = state
        .store
        .list()
        .await?
        .into_iter()
        .find(|f| f.id == id)
        .ok_or_else(|| AppError::not_found(format!("file `{}` not found", id)))?;
    Ok(Json(file.into()))
}

/// `GET /files/{id}/download` — the payload as an attachment.
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let downloaded = state.store.download(&id).await?;

    let mut headers = HeaderMap::new();
    set_download_headers(&mut headers, &downloaded);

    let mut response = Response::new(Body::from(downloaded.content));
    *response.status_mut() = StatusCode::OK;
    *response.headers_mut() = headers;
    Ok(response)
}

/// `DELETE /files/{id}`
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.store.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn set_download_headers(headers: &mut HeaderMap, downloaded: &DownloadedFile) {
    let meta = &downloaded.file;
    let content_type = if meta.content_type.is_empty() {
        "application/octet-stream"
    } else {
        meta.content_type.as_str()
    };
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(downloaded.content.len() as u64),
    );

    if let Ok(value) = HeaderValue::from_str(&content_disposition(&meta.name)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    if let Some(checksum) = downloaded.checksum.as_deref() {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", checksum)) {
            headers.insert(header::ETAG, value);
        }
        if let Some(value) = content_md5(checksum).and_then(|v| HeaderValue::from_str(&v).ok()) {
            headers.insert(HeaderName::from_static("content-md5"), value);
        }
    }
}

/// Base64 `Content-MD5` value from a stored hex MD5 digest.
fn content_md5(checksum: &str) -> Option<String> {
    let digest = hex::decode(checksum).ok()?;
    (digest.len() == 16).then(|| general_purpose::STANDARD.encode(digest))
}

/// `attachment` disposition with an ASCII fallback name and an RFC 5987
/// `filename*` carrying the exact UTF-8 name.
fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();

    let mut encoded = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback, encoded
    )
}
