#![warn(clippy::unwrap_in_result)]
#![warn(clippy::unwrap_used)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Key prefix of objects created by uploads.
pub const UPLOADS_PREFIX: &str = "uploads/";
/// Key prefix of objects created by conversions.
pub const CONVERTED_PREFIX: &str = "converted/";

/// Represents an object kept in the object store.
///
/// An object is an opaque payload addressed by a unique key. The store keeps
/// the payload's content type, size, upload time and content hash next to it.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredObject {
    /// Unique key naming the object, e.g. `uploads/1700000000000-cat.jfif`
    pub key: String,
    /// Size of the payload in bytes
    pub size: usize,
    /// MIME type recorded on upload
    pub content_type: String,
    /// Time the payload was written
    pub uploaded: DateTime<Utc>,
    /// BLAKE3 hash of the payload
    pub etag: String,
}

impl StoredObject {
    /// Last segment of the key, used as the download file name.
    #[must_use]
    pub fn file_name(&self) -> &str {
        file_name_from_key(&self.key)
    }
}

/// Returns the part of a key after its last path separator.
#[must_use]
pub fn file_name_from_key(key: &str) -> &str {
    if let Some(ix) = key.rfind(&['\\', '/']) {
        &key[ix + 1..]
    } else {
        key
    }
}

/// Result of a delete operation showing the number of items removed.
#[derive(Serialize, Deserialize, Default, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteResult {
    /// Number of object records deleted
    pub objects: usize,
    /// Number of payloads deleted because nothing referenced them anymore
    pub blobs: usize,
}

/// Body of every error response.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct ErrorBody {
    pub error: String,
}

/// Service banner returned from `/`.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct Banner {
    pub status: String,
    pub message: String,
    pub version: String,
    pub environment: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct Health {
    pub status: String,
}

/// Reply to a successful upload.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UploadReply {
    pub success: bool,
    pub file_key: String,
    pub file_name: String,
    pub file_size: usize,
    pub file_type: String,
    pub message: String,
}

/// Conversion of a stored object into another format.
///
/// Every field is optional on the wire so that a missing key can be reported
/// with a precise message instead of a deserialization failure.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConvertRequest {
    pub file_key: Option<String>,
    /// One of `jpg`, `jpeg`, `png`, `webp`, `bmp`, `gif`. Defaults to `jpg`
    pub target_format: Option<String>,
    /// Quality in `0..=100`. Defaults to 80
    pub quality: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Defaults to `true`
    pub maintain_aspect_ratio: Option<bool>,
    /// One of `none`, `low`, `medium`, `high`
    pub compression_level: Option<String>,
    #[serde(default)]
    pub auto_rotate: bool,
}

/// Output side, either measured pixels or the literal `auto` when unknown.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Dimension {
    Pixels(u32),
    Auto(String),
}

impl Dimension {
    #[must_use]
    pub fn auto() -> Self {
        Dimension::Auto("auto".to_owned())
    }
}

impl From<Option<u32>> for Dimension {
    fn from(value: Option<u32>) -> Self {
        value.map_or_else(Dimension::auto, Dimension::Pixels)
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ConvertReply {
    pub success: bool,
    pub original_file_key: String,
    pub converted_file_key: String,
    pub target_format: String,
    pub quality: u32,
    pub width: Dimension,
    pub height: Dimension,
    /// Size of the stored result in bytes
    pub size: usize,
    /// `false` when the source could not be decoded and was stored unchanged
    pub transcoded: bool,
    pub message: String,
}

/// Reference to a stored object inside a batch request.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchFile {
    #[serde(default)]
    pub file_key: String,
    #[serde(default)]
    pub file_name: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub files: Option<Vec<BatchFile>>,
    pub target_format: Option<String>,
    pub quality: Option<u32>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Success,
    Failed,
}

/// Outcome of a single batch entry.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResult {
    pub original_file: BatchFile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted_file_key: Option<String>,
    pub status: BatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BatchReply {
    pub success: bool,
    pub batch_id: String,
    pub total_files: usize,
    pub results: Vec<BatchItemResult>,
    pub message: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct StatusReply {
    pub id: String,
    pub status: String,
    pub progress: u8,
    pub message: String,
}

/// Entry of the file listing.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct FileEntry {
    pub key: String,
    pub size: usize,
    pub uploaded: DateTime<Utc>,
    #[serde(rename = "type")]
    pub content_type: String,
}

impl From<StoredObject> for FileEntry {
    fn from(o: StoredObject) -> Self {
        Self {
            key: o.key,
            size: o.size,
            uploaded: o.uploaded,
            content_type: o.content_type,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct FileList {
    pub success: bool,
    pub files: Vec<FileEntry>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct DeleteReply {
    pub success: bool,
    pub message: String,
}
