//! Represents an uploaded asset file and its derived views.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Metadata of a single stored asset.
///
/// This struct never carries the binary payload. Listing and upload responses
/// are built from it; the payload is only fetched at download time and travels
/// in [`DownloadedFile`].
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    /// Opaque unique identifier (UUID v4 text).
    pub id: String,

    /// Display name as uploaded.
    pub name: String,

    /// Payload size in bytes.
    pub size: i64,

    /// MIME type reported by the uploader.
    #[serde(rename = "type")]
    pub content_type: String,

    /// Normalized lowercase extension, including the leading dot.
    pub extension: String,

    /// When the upload completed.
    pub upload_date: DateTime<Utc>,

    /// Object path inside the remote bucket. Only set by the remote backend.
    #[sqlx(default)]
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub storage_path: Option<String>,
}

impl StoredFile {
    pub fn kind(&self) -> AssetKind {
        AssetKind::from_extension(&self.extension)
    }
}

/// Input to a backend `save`.
#[derive(Clone, Debug)]
pub struct NewFile {
    pub name: String,
    pub content_type: String,
    pub content: Bytes,
}

/// Metadata plus payload, produced only by a download.
#[derive(Clone, Debug)]
pub struct DownloadedFile {
    pub file: StoredFile,
    pub content: Bytes,
    /// Hex MD5 of the payload, when the backend keeps one.
    pub checksum: Option<String>,
}

/// Coarse asset category derived from the extension.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    /// `.rbxl` / `.rbxlx`
    Place,
    /// `.rbxm` / `.rbxmx`
    Model,
    Other,
}

impl AssetKind {
    pub fn from_extension(ext: &str) -> Self {
        if ext.contains("rbxl") {
            AssetKind::Place
        } else if ext.contains("rbxm") {
            AssetKind::Model
        } else {
            AssetKind::Other
        }
    }
}

/// Listing entry: metadata plus presentation helpers.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    #[serde(flatten)]
    pub file: StoredFile,
    pub kind: AssetKind,
    pub size_display: String,
}

impl From<StoredFile> for FileSummary {
    fn from(file: StoredFile) -> Self {
        let kind = file.kind();
        let size_display = format_size(file.size);
        Self {
            file,
            kind,
            size_display,
        }
    }
}

const SIZE_UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Human readable size in base 1024, e.g. `1.5 KB`.
///
/// Values are rounded to two decimals with trailing zeros dropped. Sizes past
/// the gigabyte range stay in `GB`.
pub fn format_size(bytes: i64) -> String {
    if bytes <= 0 {
        return "0 B".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, SIZE_UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(extension: &str) -> StoredFile {
        StoredFile {
            id: "abc".into(),
            name: format!("thing{}", extension),
            size: 1536,
            content_type: "application/octet-stream".into(),
            extension: extension.into(),
            upload_date: Utc::now(),
            storage_path: None,
        }
    }

    #[test]
    fn format_size_matches_listing_style() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1024), "1 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(50 * 1024 * 1024), "50 MB");
        assert_eq!(format_size(1_234_567), "1.18 MB");
    }

    #[test]
    fn kind_follows_extension() {
        assert_eq!(sample(".rbxl").kind(), AssetKind::Place);
        assert_eq!(sample(".rbxlx").kind(), AssetKind::Place);
        assert_eq!(sample(".rbxmx").kind(), AssetKind::Model);
        assert_eq!(sample(".rbxasset").kind(), AssetKind::Other);
    }

    #[test]
    fn json_uses_camel_case_and_hides_missing_storage_path() {
        let value = serde_json::to_value(sample(".rbxm")).unwrap();
        assert_eq!(value["type"], "application/octet-stream");
        assert!(value.get("uploadDate").is_some());
        assert!(value.get("storagePath").is_none());
        assert!(value.get("content").is_none());

        let summary = serde_json::to_value(FileSummary::from(sample(".rbxm"))).unwrap();
        assert_eq!(summary["kind"], "model");
        assert_eq!(summary["sizeDisplay"], "1.5 KB");
        assert_eq!(summary["name"], "thing.rbxm");
    }
}
