//! Upload hub for Roblox asset files (`.rbxm`, `.rbxl`, ...) backed either by
//! an embedded SQLite store or a hosted storage bucket + metadata table.

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod validation;

use anyhow::{Context, Result};
use axum::{Router, extract::DefaultBodyLimit};
use config::AppConfig;
use services::{
    local_store::LocalStore,
    remote_store::RemoteStore,
    store::{Backend, SharedStore},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Room left for multipart boundaries and part headers on top of the payload.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub max_file_size_bytes: u64,
}

impl AppState {
    pub fn new(store: SharedStore, max_file_size_bytes: u64) -> Self {
        Self {
            store,
            max_file_size_bytes,
        }
    }
}

/// Build the router with request tracing and a body limit sized for the
/// configured upload ceiling.
pub fn create_app(state: AppState) -> Router {
    let body_limit = usize::try_from(state.max_file_size_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    routes::routes()
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Construct the backend selected by `cfg`. The local backend is migrated on
/// open so a fresh database is usable immediately.
pub async fn build_store(cfg: &AppConfig) -> Result<SharedStore> {
    match cfg.backend {
        Backend::Local => {
            let pool = db::connect(&cfg.database_url).await?;
            db::run_migrations(&pool).await?;
            Ok(Arc::new(LocalStore::new(Arc::new(pool))))
        }
        Backend::Remote => {
            let remote = cfg
                .remote
                .clone()
                .context("remote backend selected without remote settings")?;
            tracing::info!(
                "Using remote backend at {} (bucket `{}`, table `{}`)",
                remote.base_url,
                remote.bucket,
                remote.table
            );
            Ok(Arc::new(RemoteStore::new(remote)?))
        }
    }
}
