//! RemoteStore — a hosted backend-as-a-service reached over HTTP.
//!
//! Payloads live in a storage bucket (`/storage/v1/object/...`), metadata in a
//! REST table (`/rest/v1/{table}`). An upload is a storage write followed by a
//! row insert; when the insert fails the storage object is removed again.

use crate::{
    models::stored_file::{DownloadedFile, NewFile, StoredFile},
    services::store::{Backend, FileStore, StorageError, StorageResult},
    validation::{normalize_extension, storage_object_name},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, header};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

pub const DEFAULT_BUCKET: &str = "roblox-assets";
pub const DEFAULT_TABLE: &str = "files";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct RemoteConfig {
    pub base_url: Url,
    pub api_key: String,
    pub bucket: String,
    pub table: String,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct RemoteStore {
    client: Client,
    config: RemoteConfig,
}

/// Row shape of the metadata table.
#[derive(Debug, Deserialize)]
struct FileRow {
    id: String,
    name: String,
    size: i64,
    #[serde(rename = "type", default)]
    content_type: Option<String>,
    #[serde(default)]
    extension: Option<String>,
    #[serde(default)]
    storage_path: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<FileRow> for StoredFile {
    fn from(row: FileRow) -> Self {
        let extension = row
            .extension
            .unwrap_or_else(|| normalize_extension(&row.name));
        Self {
            id: row.id,
            name: row.name,
            size: row.size,
            content_type: row.content_type.unwrap_or_default(),
            extension,
            upload_date: row.created_at,
            storage_path: row.storage_path,
        }
    }
}

#[derive(Debug, Serialize)]
struct NewRow<'a> {
    id: &'a str,
    name: &'a str,
    size: i64,
    #[serde(rename = "type")]
    content_type: &'a str,
    extension: &'a str,
    storage_path: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
    msg: Option<String>,
}

impl RemoteStore {
    pub fn new(config: RemoteConfig) -> StorageResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Build `{base_url}/{segments...}`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> StorageResult<Url> {
        let mut url = self.config.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                StorageError::Decode(format!(
                    "base url `{}` cannot carry a path",
                    self.config.base_url
                ))
            })?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    fn table_url(&self) -> StorageResult<Url> {
        self.endpoint(&["rest", "v1", self.config.table.as_str()])
    }

    fn object_url(&self, storage_path: &str) -> StorageResult<Url> {
        self.endpoint(&["storage", "v1", "object", self.config.bucket.as_str(), storage_path])
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }

    async fn fetch_row(&self, id: &str) -> StorageResult<Option<FileRow>> {
        let filter = format!("eq.{}", id);
        let response = self
            .authorized(self.client.get(self.table_url()?))
            .query(&[("select", "*"), ("id", filter.as_str())])
            .send()
            .await?;
        let mut rows: Vec<FileRow> = ensure_success(response).await?.json().await?;
        Ok(rows.pop())
    }

    async fn remove_object(&self, storage_path: &str) -> StorageResult<()> {
        let url = self.endpoint(&["storage", "v1", "object", self.config.bucket.as_str()])?;
        let response = self
            .authorized(self.client.delete(url))
            .json(&json!({ "prefixes": [storage_path] }))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn insert_row(&self, row: &NewRow<'_>) -> StorageResult<StoredFile> {
        let response = self
            .authorized(self.client.post(self.table_url()?))
            .header("Prefer", "return=representation")
            .json(&[row])
            .send()
            .await?;
        let mut rows: Vec<FileRow> = ensure_success(response).await?.json().await?;
        rows.pop()
            .map(StoredFile::from)
            .ok_or_else(|| StorageError::Decode("insert returned no row".into()))
    }
}

#[async_trait]
impl FileStore for RemoteStore {
    fn backend(&self) -> Backend {
        Backend::Remote
    }

    async fn save(&self, file: NewFile) -> StorageResult<StoredFile> {
        let id = Uuid::new_v4().to_string();
        let extension = normalize_extension(&file.name);
        let storage_path = storage_object_name(&file.name, Utc::now().timestamp_millis());
        let content_type = if file.content_type.is_empty() {
            "application/octet-stream"
        } else {
            file.content_type.as_str()
        };
        let size = file.content.len() as i64;

        debug!("uploading {} to bucket {}", storage_path, self.config.bucket);
        let response = self
            .authorized(self.client.post(self.object_url(&storage_path)?))
            .header(header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(file.content.clone())
            .send()
            .await?;
        ensure_success(response).await?;

        let row = NewRow {
            id: &id,
            name: &file.name,
            size,
            content_type: &file.content_type,
            extension: &extension,
            storage_path: &storage_path,
        };
        match self.insert_row(&row).await {
            Ok(stored) => {
                info!(id = %stored.id, path = %storage_path, "stored file remotely");
                Ok(stored)
            }
            Err(err) => {
                warn!("metadata insert failed, removing {}: {}", storage_path, err);
                if let Err(cleanup) = self.remove_object(&storage_path).await {
                    warn!("rollback of {} failed: {}", storage_path, cleanup);
                }
                Err(err)
            }
        }
    }

    async fn list(&self) -> StorageResult<Vec<StoredFile>> {
        let response = self
            .authorized(self.client.get(self.table_url()?))
            .query(&[("select", "*"), ("order", "created_at.desc")])
            .send()
            .await?;
        let rows: Vec<FileRow> = ensure_success(response).await?.json().await?;
        debug!("listed {} remote files", rows.len());
        Ok(rows.into_iter().map(StoredFile::from).collect())
    }

    async fn download(&self, id: &str) -> StorageResult<DownloadedFile> {
        let file: StoredFile = self
            .fetch_row(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?
            .into();
        let storage_path = file
            .storage_path
            .clone()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;

        let response = self
            .authorized(self.client.get(self.object_url(&storage_path)?))
            .send()
            .await?;
        let content = ensure_success(response).await?.bytes().await?;

        Ok(DownloadedFile {
            file,
            content,
            checksum: None,
        })
    }

    /// Remove the storage object best-effort, then the metadata row.
    async fn delete(&self, id: &str) -> StorageResult<()> {
        let row = self.fetch_row(id).await?;

        if let Some(storage_path) = row.as_ref().and_then(|r| r.storage_path.as_deref()) {
            if let Err(err) = self.remove_object(storage_path).await {
                warn!("storage delete of {} failed: {}", storage_path, err);
            }
        }

        let filter = format!("eq.{}", id);
        let response = self
            .authorized(self.client.delete(self.table_url()?))
            .query(&[("id", filter.as_str())])
            .send()
            .await?;
        ensure_success(response).await?;

        info!(id = %id, "deleted remote file");
        Ok(())
    }

    async fn ping(&self) -> StorageResult<()> {
        let response = self
            .authorized(self.client.get(self.table_url()?))
            .query(&[("select", "id"), ("limit", "1")])
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

/// Turn a non-2xx response into `StorageError::Remote`, preferring the
/// service's own error message.
async fn ensure_success(response: Response) -> StorageResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.message.or(body.error).or(body.msg))
        .unwrap_or_else(|| {
            if text.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                text
            }
        });

    Err(StorageError::Remote {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, header, method, path, path_regex, query_param},
    };

    const KEY: &str = "test-key";

    fn store_for(server: &MockServer) -> RemoteStore {
        RemoteStore::new(RemoteConfig {
            base_url: Url::parse(&server.uri()).unwrap(),
            api_key: KEY.to_string(),
            bucket: DEFAULT_BUCKET.to_string(),
            table: DEFAULT_TABLE.to_string(),
            timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    fn row(id: &str, name: &str, created_at: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": name,
            "size": 6,
            "type": "application/octet-stream",
            "extension": ".rbxm",
            "storage_path": format!("1700000000000_{}", name),
            "created_at": created_at,
        })
    }

    fn upload() -> NewFile {
        NewFile {
            name: "Race Car.rbxm".into(),
            content_type: "application/octet-stream".into(),
            content: Bytes::from_static(b"wheels"),
        }
    }

    #[tokio::test]
    async fn save_uploads_then_inserts_row() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/storage/v1/object/roblox-assets/\d+_Race_Car\.rbxm$"))
            .and(header("apikey", KEY))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Key": "x"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/files"))
            .and(header("prefer", "return=representation"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([row(
                "id-1",
                "Race Car.rbxm",
                "2024-05-01T10:00:00.123+00:00"
            )])))
            .expect(1)
            .mount(&server)
            .await;

        let saved = store_for(&server).save(upload()).await.unwrap();
        assert_eq!(saved.id, "id-1");
        assert_eq!(saved.extension, ".rbxm");
        assert_eq!(saved.upload_date.timestamp_millis(), 1714557600123);
        assert!(saved.storage_path.is_some());
    }

    #[tokio::test]
    async fn failed_upload_skips_insert() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/storage/v1/object/"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"message": "bucket full"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/files"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let err = store_for(&server).save(upload()).await.unwrap_err();
        assert!(
            matches!(err, StorageError::Remote { status: 400, ref message } if message == "bucket full")
        );
    }

    #[tokio::test]
    async fn failed_insert_rolls_back_storage_object() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/storage/v1/object/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/files"))
            .respond_with(
                ResponseTemplate::new(409).set_body_json(json!({"message": "duplicate key"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/storage/v1/object/roblox-assets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let err = store_for(&server).save(upload()).await.unwrap_err();
        assert!(matches!(err, StorageError::Remote { status: 409, .. }));

        let requests = server.received_requests().await.unwrap();
        let uploaded = requests
            .iter()
            .find(|r| r.method.as_str() == "POST" && r.url.path().starts_with("/storage/"))
            .and_then(|r| {
                r.url
                    .path()
                    .strip_prefix("/storage/v1/object/roblox-assets/")
                    .map(str::to_string)
            })
            .unwrap();
        assert!(uploaded.ends_with("_Race_Car.rbxm"));

        let removal = requests
            .iter()
            .find(|r| r.method.as_str() == "DELETE")
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&removal.body).unwrap();
        assert_eq!(body, json!({ "prefixes": [uploaded] }));
    }

    #[tokio::test]
    async fn list_requests_newest_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/files"))
            .and(query_param("order", "created_at.desc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                row("b", "b.rbxm", "2024-05-02T00:00:00+00:00"),
                row("a", "a.rbxm", "2024-05-01T00:00:00+00:00"),
            ])))
            .mount(&server)
            .await;

        let files = store_for(&server).list().await.unwrap();
        let ids: Vec<_> = files.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[tokio::test]
    async fn download_fetches_payload_by_storage_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/files"))
            .and(query_param("id", "eq.abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([row(
                "abc",
                "car.rbxm",
                "2024-05-01T00:00:00+00:00"
            )])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/object/roblox-assets/1700000000000_car.rbxm"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"wheels".to_vec()))
            .mount(&server)
            .await;

        let downloaded = store_for(&server).download("abc").await.unwrap();
        assert_eq!(downloaded.file.name, "car.rbxm");
        assert_eq!(&downloaded.content[..], b"wheels");
    }

    #[tokio::test]
    async fn download_unknown_id_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let err = store_for(&server).download("nope").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn delete_ignores_storage_failure_but_removes_row() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([row(
                "abc",
                "car.rbxm",
                "2024-05-01T00:00:00+00:00"
            )])))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/storage/v1/object/roblox-assets"))
            .and(body_json(json!({"prefixes": ["1700000000000_car.rbxm"]})))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/files"))
            .and(query_param("id", "eq.abc"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        store_for(&server).delete("abc").await.unwrap();
    }

    #[tokio::test]
    async fn delete_propagates_row_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/files"))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
            .mount(&server)
            .await;

        let err = store_for(&server).delete("abc").await.unwrap_err();
        assert!(
            matches!(err, StorageError::Remote { status: 403, ref message } if message == "denied")
        );
    }

    #[test]
    fn rows_without_extension_derive_it_from_the_name() {
        let row: FileRow = serde_json::from_value(json!({
            "id": "x",
            "name": "Lobby.RBXL",
            "size": 1,
            "created_at": "2024-05-01T00:00:00+00:00",
        }))
        .unwrap();
        let file = StoredFile::from(row);
        assert_eq!(file.extension, ".rbxl");
        assert_eq!(file.content_type, "");

        let row: FileRow = serde_json::from_value(json!({
            "id": "y",
            "name": "README",
            "size": 1,
            "created_at": "2024-05-01T00:00:00+00:00",
        }))
        .unwrap();
        assert_eq!(StoredFile::from(row).extension, ".readme");
    }

    #[test]
    fn endpoint_keeps_base_path_and_encodes_segments() {
        let store = RemoteStore::new(RemoteConfig {
            base_url: Url::parse("https://example.supabase.co/").unwrap(),
            api_key: KEY.into(),
            bucket: DEFAULT_BUCKET.into(),
            table: DEFAULT_TABLE.into(),
            timeout: DEFAULT_TIMEOUT,
        })
        .unwrap();

        assert_eq!(
            store.object_url("1_a b.rbxm").unwrap().as_str(),
            "https://example.supabase.co/storage/v1/object/roblox-assets/1_a%20b.rbxm"
        );
        assert_eq!(
            store.table_url().unwrap().as_str(),
            "https://example.supabase.co/rest/v1/files"
        );
    }
}
