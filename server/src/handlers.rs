#![allow(clippy::unused_async)]
use crate::domain::ObjectStore;
use crate::error::{internal, ApiError};
use crate::file_reply::FileReply;
use crate::keys;
use crate::sqlite::{Mode, Sqlite, StoreError};
use crate::AppState;
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use chrono::Utc;
use converter::{CompressionLevel, ConvertError, ConvertOptions, Converted, OutputFormat, Resize};
use futures::{Stream, TryStreamExt};
use kernel::{
    Banner, BatchFile, BatchItemResult, BatchReply, BatchRequest, BatchStatus, ConvertReply,
    ConvertRequest, DeleteReply, Dimension, FileEntry, FileList, Health, StatusReply, UploadReply,
    UPLOADS_PREFIX,
};
use serde::Deserialize;
use std::io;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;
use utoipa::IntoParams;

const FILE_FIELD: &str = "file";
const DEFAULT_QUALITY: u32 = 80;
const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_LIST_LIMIT: usize = 1000;
const SIZE_TOO_LARGE: &str = "Requested size too large";

/// Service banner.
#[utoipa::path(
    get,
    path = "/",
    tag = "health",
    responses(
        (status = 200, description = "Service is up", body = Banner),
    ),
)]
pub async fn banner(State(state): State<AppState>) -> Json<Banner> {
    Json(Banner {
        status: "ok".to_owned(),
        message: "Image Converter API".to_owned(),
        version: env!("CARGO_PKG_VERSION").to_owned(),
        environment: state.config.environment.clone(),
    })
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = Health),
    ),
)]
pub async fn health() -> Json<Health> {
    Json(Health {
        status: "healthy".to_owned(),
    })
}

/// Stores a single image from the `file` field of a multipart form.
///
/// The field must carry one of the allowed image content types.
#[utoipa::path(
    post,
    path = "/api/upload",
    tag = "files",
    responses(
        (status = 200, description = "File stored", body = UploadReply),
        (status = 400, description = "No file, invalid type or file too large", body = kernel::ErrorBody),
        (status = 500, description = "Server error", body = kernel::ErrorBody)
    ),
)]
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadReply>, ApiError> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("multipart error: {e}");
                return Err(ApiError::bad_request("Invalid multipart body"));
            }
        };

        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_owned();
        let content_type = field.content_type().unwrap_or_default().to_owned();

        let limit = state.config.max_upload_bytes;
        let (data, read_bytes) = read_from_stream(field, limit).await.map_err(|e| {
            tracing::error!("file '{file_name}' not read. Error: {e}");
            ApiError::bad_request("Invalid multipart body")
        })?;

        if !state.config.is_allowed_type(&content_type) {
            tracing::info!("file '{file_name}' rejected, type: '{content_type}'");
            return Err(ApiError::bad_request("Invalid file type"));
        }

        if read_bytes > limit {
            tracing::info!("file '{file_name}' rejected, size: {read_bytes}");
            return Err(ApiError::bad_request("File too large"));
        }

        let key = keys::upload_key(&file_name, Utc::now().timestamp_millis());
        let stored = execute(&state.db, Mode::ReadWrite, |mut repository| {
            repository.put(&key, data, &content_type)
        })
        .map_err(internal("Upload failed"))?;

        tracing::info!("file: {} read: {} key: {}", file_name, read_bytes, stored.key);

        return Ok(Json(UploadReply {
            success: true,
            file_key: stored.key,
            file_name,
            file_size: stored.size,
            file_type: stored.content_type,
            message: "File uploaded successfully".to_owned(),
        }));
    }

    Err(ApiError::bad_request("No file provided"))
}

/// Converts a stored image into another format and stores the result.
///
/// Sources that cannot be decoded are stored unchanged under the new key.
#[utoipa::path(
    post,
    path = "/api/convert",
    tag = "conversion",
    request_body = ConvertRequest,
    responses(
        (status = 200, description = "Converted file stored", body = ConvertReply),
        (status = 400, description = "Missing or unknown file, invalid options", body = kernel::ErrorBody),
        (status = 500, description = "Server error", body = kernel::ErrorBody)
    ),
)]
pub async fn convert(
    State(state): State<AppState>,
    payload: Result<Json<ConvertRequest>, JsonRejection>,
) -> Result<Json<ConvertReply>, ApiError> {
    let Json(request) = payload.map_err(invalid_body)?;

    let Some(file_key) = request.file_key.clone().filter(|k| !k.is_empty()) else {
        return Err(ApiError::bad_request("File key is required"));
    };
    let options = convert_options(&request, state.config.max_dimension)?;
    let quality = request.quality.unwrap_or(DEFAULT_QUALITY);

    let source = execute(&state.db, Mode::ReadOnly, |repository| {
        repository.get(&file_key)
    })
    .map_err(internal("Conversion failed"))?
    .ok_or_else(|| ApiError::bad_request("Original file not found"))?;

    let format = options.format;
    let (data, width, height, transcoded) = match transcode(source, options).await? {
        Transcoded::Converted(c) => (
            c.data,
            Dimension::Pixels(c.width),
            Dimension::Pixels(c.height),
            true,
        ),
        Transcoded::Copied(data) => (
            data,
            Dimension::from(request.width),
            Dimension::from(request.height),
            false,
        ),
    };

    let converted_key = keys::converted_key(&file_key, format, Utc::now().timestamp_millis());
    let stored = execute(&state.db, Mode::ReadWrite, |mut repository| {
        repository.put(&converted_key, data, format.mime())
    })
    .map_err(internal("Conversion failed"))?;

    tracing::info!("file: {} converted into: {}", file_key, stored.key);

    Ok(Json(ConvertReply {
        success: true,
        original_file_key: file_key,
        converted_file_key: stored.key,
        target_format: format.to_string(),
        quality,
        width,
        height,
        size: stored.size,
        transcoded,
        message: "Image converted successfully".to_owned(),
    }))
}

/// Converts several stored images one after another.
///
/// Each entry succeeds or fails on its own.
#[utoipa::path(
    post,
    path = "/api/batch",
    tag = "conversion",
    request_body = BatchRequest,
    responses(
        (status = 200, description = "Batch processed", body = BatchReply),
        (status = 400, description = "No files, too many files or invalid options", body = kernel::ErrorBody),
    ),
)]
pub async fn batch(
    State(state): State<AppState>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchReply>, ApiError> {
    let Json(request) = payload.map_err(invalid_body)?;

    let files = request.files.unwrap_or_default();
    if files.is_empty() {
        return Err(ApiError::bad_request("Files array is required"));
    }
    let max = state.config.max_batch_files;
    if files.len() > max {
        return Err(ApiError::bad_request(format!(
            "Maximum {max} files allowed"
        )));
    }

    let options = ConvertOptions {
        quality: Some(request.quality.unwrap_or(DEFAULT_QUALITY)),
        ..ConvertOptions::new(parse_format(request.target_format.as_deref())?)
    };

    let batch_id = keys::batch_id(Utc::now().timestamp_millis());
    let total_files = files.len();
    let mut results = Vec::with_capacity(total_files);

    for file in files {
        let result = match convert_batch_item(&state.db, &file, &options).await {
            Ok(converted_file_key) => BatchItemResult {
                original_file: file,
                converted_file_key: Some(converted_file_key),
                status: BatchStatus::Success,
                error: None,
            },
            Err(e) => {
                tracing::error!("{batch_id}: file '{}' not converted. Error: {e}", file.file_key);
                BatchItemResult {
                    original_file: file,
                    converted_file_key: None,
                    status: BatchStatus::Failed,
                    error: Some(e.to_string()),
                }
            }
        };
        results.push(result);
    }

    let failed = results
        .iter()
        .filter(|r| r.status == BatchStatus::Failed)
        .count();
    tracing::info!("{batch_id}: {total_files} files, {failed} failed");

    Ok(Json(BatchReply {
        success: true,
        batch_id,
        total_files,
        results,
        message: "Batch conversion completed".to_owned(),
    }))
}

/// Progress of a conversion. Conversions finish within their request so this is always complete.
#[utoipa::path(
    get,
    path = "/api/status/{id}",
    tag = "conversion",
    responses(
        (status = 200, description = "Conversion status", body = StatusReply),
    ),
    params(
        ("id" = String, Path, description = "Conversion or batch id")
    ),
)]
pub async fn status(Path(id): Path<String>) -> Json<StatusReply> {
    Json(StatusReply {
        id,
        status: "completed".to_owned(),
        progress: 100,
        message: "Conversion completed".to_owned(),
    })
}

/// Gets object binary content by key
#[utoipa::path(
    get,
    path = "/api/download/{file_key}",
    tag = "files",
    responses(
        (status = 200, description = "File binary content", body = Vec<u8>, content_type = "application/octet-stream"),
        (status = 404, description = "File not found", body = kernel::ErrorBody),
        (status = 500, description = "Server error", body = kernel::ErrorBody)
    ),
    params(
        ("file_key" = String, Path, description = "Percent-encoded object key")
    ),
)]
pub async fn download(
    Path(file_key): Path<String>,
    State(state): State<AppState>,
) -> Result<FileReply, ApiError> {
    let reply = execute(&state.db, Mode::ReadOnly, |repository| {
        let Some(info) = repository.head(&file_key)? else {
            return Ok(None);
        };
        let data = repository.get(&file_key)?;
        Ok(data.map(|content| FileReply::new(content, info)))
    })
    .map_err(internal("Download failed"))?;

    reply.ok_or_else(|| {
        tracing::info!("file: {file_key} not found");
        ApiError::not_found("File not found")
    })
}

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// Key prefix, `uploads/` by default
    prefix: Option<String>,
    /// Maximum number of entries, 100 by default
    limit: Option<usize>,
}

/// Lists stored objects
#[utoipa::path(
    get,
    path = "/api/files",
    tag = "files",
    params(ListParams),
    responses(
        (status = 200, description = "Objects listed", body = FileList),
        (status = 500, description = "Server error", body = kernel::ErrorBody)
    ),
)]
pub async fn list_files(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<FileList>, ApiError> {
    let prefix = params.prefix.unwrap_or_else(|| UPLOADS_PREFIX.to_owned());
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .min(MAX_LIST_LIMIT);

    let objects = execute(&state.db, Mode::ReadOnly, |repository| {
        repository.list(&prefix, limit)
    })
    .map_err(internal("Failed to list files"))?;

    Ok(Json(FileList {
        success: true,
        files: objects.into_iter().map(FileEntry::from).collect(),
    }))
}

/// Deletes object by key. Deleting a missing object succeeds.
#[utoipa::path(
    delete,
    path = "/api/file/{file_key}",
    tag = "files",
    responses(
        (status = 200, description = "File deleted", body = DeleteReply),
        (status = 500, description = "Server error", body = kernel::ErrorBody)
    ),
    params(
        ("file_key" = String, Path, description = "Percent-encoded object key")
    ),
)]
pub async fn delete_file(
    Path(file_key): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<DeleteReply>, ApiError> {
    let deleted = execute(&state.db, Mode::ReadWrite, |mut repository| {
        repository.delete(&file_key)
    })
    .map_err(internal("File deletion failed"))?;

    if deleted.objects > 0 {
        tracing::info!(
            "file: {} deleted. Blobs removed {}",
            file_key,
            deleted.blobs
        );
    } else {
        tracing::info!("file: {} not exist", file_key);
    }

    Ok(Json(DeleteReply {
        success: true,
        message: "File deleted successfully".to_owned(),
    }))
}

pub async fn not_found() -> ApiError {
    ApiError::not_found("Not Found")
}

enum Transcoded {
    Converted(Converted),
    Copied(Vec<u8>),
}

/// Runs the conversion on the blocking pool. Undecodable sources come back untouched.
async fn transcode(source: Vec<u8>, options: ConvertOptions) -> Result<Transcoded, ApiError> {
    let start = Instant::now();
    let outcome = tokio::task::spawn_blocking(move || {
        match converter::convert(&source, &options) {
            Ok(converted) => Ok(Transcoded::Converted(converted)),
            Err(ConvertError::Decode(e)) => {
                tracing::warn!("source is not a decodable image, copying bytes. Error: {e}");
                Ok(Transcoded::Copied(source))
            }
            Err(e) => Err(e),
        }
    })
    .await
    .map_err(internal("Conversion failed"))?
    .map_err(|e| match e {
        ConvertError::TooLarge { .. } => {
            tracing::info!("conversion rejected: {e}");
            ApiError::bad_request(SIZE_TOO_LARGE)
        }
        e => internal("Conversion failed")(e),
    });
    tracing::debug!("conversion time: {:?}", start.elapsed());
    outcome
}

async fn convert_batch_item(
    db: &std::path::Path,
    file: &BatchFile,
    options: &ConvertOptions,
) -> Result<String, String> {
    let source = execute(db, Mode::ReadOnly, |repository| repository.get(&file.file_key))
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "File not found".to_owned())?;

    let format = options.format;
    let data = match transcode(source, options.clone())
        .await
        .map_err(|e| e.to_string())?
    {
        Transcoded::Converted(c) => c.data,
        Transcoded::Copied(data) => data,
    };

    let name = if file.file_name.is_empty() {
        &file.file_key
    } else {
        &file.file_name
    };
    let key = keys::converted_key(name, format, Utc::now().timestamp_millis());
    let stored = execute(db, Mode::ReadWrite, |mut repository| {
        repository.put(&key, data, format.mime())
    })
    .map_err(|e| e.to_string())?;
    Ok(stored.key)
}

fn convert_options(request: &ConvertRequest, max_dimension: u32) -> Result<ConvertOptions, ApiError> {
    let too_large = |side: Option<u32>| side.is_some_and(|s| s > max_dimension);
    if too_large(request.width) || too_large(request.height) {
        return Err(ApiError::bad_request(SIZE_TOO_LARGE));
    }

    let format = parse_format(request.target_format.as_deref())?;
    let compression_level = request
        .compression_level
        .as_deref()
        .map(str::parse::<CompressionLevel>)
        .transpose()
        .map_err(|_| ApiError::bad_request("Unknown compression level"))?;

    let resize = if request.width.is_some() || request.height.is_some() {
        Resize::custom(request.width, request.height)
    } else {
        Resize::Original
    };

    Ok(ConvertOptions {
        format,
        quality: Some(request.quality.unwrap_or(DEFAULT_QUALITY)),
        resize,
        maintain_aspect_ratio: request.maintain_aspect_ratio.unwrap_or(true),
        compression_level,
        auto_rotate: request.auto_rotate,
        clear_metadata: true,
    })
}

fn parse_format(target_format: Option<&str>) -> Result<OutputFormat, ApiError> {
    target_format.map_or(Ok(OutputFormat::Jpg), |f| {
        f.parse()
            .map_err(|_| ApiError::bad_request("Unsupported target format"))
    })
}

fn invalid_body(rejection: JsonRejection) -> ApiError {
    tracing::info!("request body rejected: {rejection}");
    ApiError::bad_request("Invalid request body")
}

fn execute<F, R>(db: &std::path::Path, mode: Mode, action: F) -> Result<R, StoreError>
where
    F: FnOnce(Sqlite) -> Result<R, StoreError>,
{
    let start = Instant::now();
    let repository = Sqlite::open(db, mode)?;
    let res = action(repository);
    tracing::debug!("DB query time: {:?}", start.elapsed());
    res
}

/// Reads at most `limit + 1` bytes into memory and discards the rest.
///
/// Returns the bytes kept and the total number of bytes read from the stream.
async fn read_from_stream<S, E>(stream: S, limit: u64) -> io::Result<(Vec<u8>, u64)>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Sync + std::error::Error + Send + 'static,
{
    // Convert the stream into an `AsyncRead`.
    let body_with_io_error = stream.map_err(io::Error::other);
    let body_reader = StreamReader::new(body_with_io_error);
    futures::pin_mut!(body_reader);

    let mut buffer = Vec::new();
    let mut limited = (&mut body_reader).take(limit.saturating_add(1));
    let kept = tokio::io::copy(&mut limited, &mut buffer).await?;
    let dropped = tokio::io::copy(&mut body_reader, &mut tokio::io::sink()).await?;
    Ok((buffer, kept + dropped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use rstest::rstest;

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = Result<Bytes, io::Error>> {
        let items: Vec<Result<Bytes, io::Error>> =
            parts.iter().map(|p| Ok(Bytes::from_static(p))).collect();
        stream::iter(items)
    }

    #[rstest]
    #[case(&[b"abc" as &[u8], b"def"], 10, b"abcdef".to_vec(), 6)]
    #[case(&[b"abc" as &[u8], b"def"], 6, b"abcdef".to_vec(), 6)]
    #[case(&[b"abc" as &[u8], b"def"], 4, b"abcde".to_vec(), 6)]
    #[case(&[], 4, Vec::new(), 0)]
    #[tokio::test]
    async fn read_from_stream_caps_buffer(
        #[case] parts: &[&'static [u8]],
        #[case] limit: u64,
        #[case] expected: Vec<u8>,
        #[case] total: u64,
    ) {
        // Act
        let (data, read) = read_from_stream(chunks(parts), limit).await.unwrap();

        // Assert
        assert_eq!(data, expected);
        assert_eq!(read, total);
    }

    #[rstest]
    #[case(None, Ok(OutputFormat::Jpg))]
    #[case(Some("webp"), Ok(OutputFormat::WebP))]
    #[case(Some("tiff"), Err(()))]
    #[trace]
    fn parse_target_format(#[case] input: Option<&str>, #[case] expected: Result<OutputFormat, ()>) {
        assert_eq!(parse_format(input).map_err(|_| ()), expected);
    }

    #[test]
    fn convert_options_from_request() {
        // Arrange
        let request = ConvertRequest {
            file_key: Some("uploads/1-a.png".to_owned()),
            target_format: Some("png".to_owned()),
            width: Some(50),
            compression_level: Some("high".to_owned()),
            ..ConvertRequest::default()
        };

        // Act
        let options = convert_options(&request, 16_384).unwrap();

        // Assert
        assert_eq!(options.format, OutputFormat::Png);
        assert_eq!(options.quality, Some(80));
        assert_eq!(options.resize, Resize::custom(Some(50), None));
        assert!(options.maintain_aspect_ratio);
        assert_eq!(options.compression_level, Some(CompressionLevel::High));
    }

    #[test]
    fn convert_options_rejects_unknown_compression() {
        // Arrange
        let request = ConvertRequest {
            compression_level: Some("extreme".to_owned()),
            ..ConvertRequest::default()
        };

        // Act
        let result = convert_options(&request, 16_384);

        // Assert
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[rstest]
    #[case(Some(400_000), Some(400_000))]
    #[case(Some(16_385), None)]
    #[case(None, Some(16_385))]
    #[trace]
    fn convert_options_rejects_oversized_sides(#[case] width: Option<u32>, #[case] height: Option<u32>) {
        // Arrange
        let request = ConvertRequest {
            width,
            height,
            ..ConvertRequest::default()
        };

        // Act
        let result = convert_options(&request, 16_384);

        // Assert
        assert!(matches!(result, Err(ApiError::BadRequest(m)) if m == "Requested size too large"));
    }
}
