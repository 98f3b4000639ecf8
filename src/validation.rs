//! Upload validation for Roblox asset files.

use thiserror::Error;

/// Extensions accepted for upload, lowercase with the leading dot.
pub const ALLOWED_EXTENSIONS: [&str; 7] = [
    ".rbxm", ".rbxmx", ".rbxl", ".rbxlx", ".rbxs", ".rbxst", ".rbxasset",
];

pub const MAX_FILE_SIZE_MB: u64 = 50;
pub const MAX_FILE_SIZE_BYTES: u64 = MAX_FILE_SIZE_MB * 1024 * 1024;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("file name is missing")]
    MissingName,
    #[error("invalid file format `{name}`, allowed: {allowed}", allowed = ALLOWED_EXTENSIONS.join(", "))]
    InvalidExtension { name: String },
    #[error("file is too large ({size} bytes), maximum is {max} bytes")]
    TooLarge { size: u64, max: u64 },
}

/// Lowercase extension of `name` with a leading dot.
///
/// Everything after the last dot is taken, so a name without a dot yields
/// `"." + name` and a trailing dot yields `"."`.
pub fn normalize_extension(name: &str) -> String {
    let ext = name.rsplit('.').next().unwrap_or(name);
    format!(".{}", ext.to_lowercase())
}

/// Check an upload against the allowed extensions and the size ceiling.
///
/// On success returns the normalized extension to persist alongside the file.
pub fn validate_upload(name: &str, size: u64, max_bytes: u64) -> Result<String, ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::MissingName);
    }

    let lowered = name.to_lowercase();
    if !ALLOWED_EXTENSIONS.iter().any(|ext| lowered.ends_with(ext)) {
        return Err(ValidationError::InvalidExtension {
            name: name.to_string(),
        });
    }

    if size > max_bytes {
        return Err(ValidationError::TooLarge {
            size,
            max: max_bytes,
        });
    }

    Ok(normalize_extension(name))
}

/// Object name used in the remote bucket: `{millis}_{name}` with every
/// whitespace run collapsed to a single underscore.
pub fn storage_object_name(name: &str, now_millis: i64) -> String {
    let mut sanitized = String::with_capacity(name.len());
    let mut in_space = false;
    for c in name.chars() {
        if c.is_whitespace() {
            if !in_space {
                sanitized.push('_');
            }
            in_space = true;
        } else {
            sanitized.push(c);
            in_space = false;
        }
    }
    format!("{}_{}", now_millis, sanitized)
}
