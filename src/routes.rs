//! Route table.
//!
//! - `GET    /healthz`, `GET /readyz` — probes
//! - `GET    /files`                  — list metadata, newest first
//! - `POST   /files`                  — multipart upload (`file` field)
//! - `GET    /files/{id}`             — metadata for one file
//! - `DELETE /files/{id}`             — delete file
//! - `GET    /files/{id}/download`    — payload as attachment

use crate::{
    AppState,
    handlers::{
        file_handlers::{delete_file, download_file, get_file, list_files, upload_file},
        health_handlers::{healthz, readyz},
    },
};
use axum::{Router, routing::get};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/files", get(list_files).post(upload_file))
        .route("/files/{id}", get(get_file).delete(delete_file))
        .route("/files/{id}/download", get(download_file))
}
