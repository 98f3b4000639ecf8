//! LocalStore — keeps asset metadata and payload together in a single SQLite
//! row, the same shape as a browser object store record. Listing queries only
//! ever select the metadata columns.

use crate::{
    models::stored_file::{DownloadedFile, NewFile, StoredFile},
    services::store::{Backend, FileStore, StorageError, StorageResult},
    validation::normalize_extension,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const METADATA_COLUMNS: &str = "id, name, size, content_type, extension, upload_date";

#[derive(Clone)]
pub struct LocalStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

#[derive(FromRow)]
struct PayloadRow {
    content: Vec<u8>,
    checksum: String,
}

impl LocalStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    async fn fetch_metadata(&self, id: &str) -> StorageResult<StoredFile> {
        sqlx::query_as::<_, StoredFile>(&format!(
            "SELECT {} FROM files WHERE id = ?",
            METADATA_COLUMNS
        ))
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::NotFound(id.to_string()),
            other => StorageError::Sqlx(other),
        })
    }
}

#[async_trait]
impl FileStore for LocalStore {
    fn backend(&self) -> Backend {
        Backend::Local
    }

    /// Insert a new row with a fresh UUID, the current timestamp and an MD5
    /// checksum of the payload.
    async fn save(&self, file: NewFile) -> StorageResult<StoredFile> {
        let stored = StoredFile {
            id: Uuid::new_v4().to_string(),
            extension: normalize_extension(&file.name),
            size: file.content.len() as i64,
            name: file.name,
            content_type: file.content_type,
            upload_date: Utc::now(),
            storage_path: None,
        };
        let checksum = format!("{:x}", md5::compute(&file.content));

        sqlx::query(
            "INSERT INTO files (id, name, size, content_type, extension, upload_date, checksum, content)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&stored.id)
        .bind(&stored.name)
        .bind(stored.size)
        .bind(&stored.content_type)
        .bind(&stored.extension)
        .bind(stored.upload_date)
        .bind(&checksum)
        .bind(file.content.as_ref())
        .execute(&*self.db)
        .await?;

        info!(id = %stored.id, name = %stored.name, size = stored.size, "stored file locally");
        Ok(stored)
    }

    async fn list(&self) -> StorageResult<Vec<StoredFile>> {
        let rows = sqlx::query_as::<_, StoredFile>(&format!(
            "SELECT {} FROM files ORDER BY upload_date DESC, id ASC",
            METADATA_COLUMNS
        ))
        .fetch_all(&*self.db)
        .await?;
        debug!("listed {} local files", rows.len());
        Ok(rows)
    }

    async fn download(&self, id: &str) -> StorageResult<DownloadedFile> {
        let file = self.fetch_metadata(id).await?;
        let payload =
            sqlx::query_as::<_, PayloadRow>("SELECT content, checksum FROM files WHERE id = ?")
                .bind(id)
                .fetch_optional(&*self.db)
                .await?
                .ok_or_else(|| StorageError::NotFound(id.to_string()))?;

        Ok(DownloadedFile {
            file,
            content: Bytes::from(payload.content),
            checksum: Some(payload.checksum),
        })
    }

    /// Remove the row. Deleting an unknown id succeeds, like an object store
    /// delete on a missing key.
    async fn delete(&self, id: &str) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;

        if result.rows_affected() == 0 {
            debug!("delete of {} matched no row", id);
        } else {
            info!(id = %id, "deleted local file");
        }
        Ok(())
    }

    async fn ping(&self) -> StorageResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        Ok(())
    }
}
