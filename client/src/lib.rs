#![warn(clippy::unwrap_in_result)]
#![warn(clippy::unwrap_used)]

use std::path::Path;

use kernel::{
    BatchReply, BatchRequest, ConvertReply, ConvertRequest, DeleteReply, ErrorBody, FileList,
    Health, UploadReply,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use resource::Resource;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

pub mod resource;

const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid service uri: {0}")]
    Uri(String),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server responded {status}: {message}")]
    Status { status: u16, message: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;

pub async fn health(uri: &str) -> Result<Health> {
    let mut resource = resource(uri)?;
    resource.append_path("api/health");

    let response = Client::new().get(resource.to_string()).send().await?;
    read_reply(response).await
}

/// Uploads a local file as the `file` field of a multipart form.
pub async fn upload_file(uri: &str, path: &Path) -> Result<UploadReply> {
    let mut resource = resource(uri)?;
    resource.append_path("api/upload");

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let file = File::open(path).await?;
    let len = file.metadata().await?.len();
    let stream = ReaderStream::new(file);
    let part = Part::stream_with_length(reqwest::Body::wrap_stream(stream), len)
        .file_name(file_name)
        .mime_str(mime_type_of(path))?;
    let form = Form::new().part("file", part);

    let response = Client::new()
        .post(resource.to_string())
        .multipart(form)
        .send()
        .await?;
    read_reply(response).await
}

pub async fn convert(uri: &str, request: &ConvertRequest) -> Result<ConvertReply> {
    let mut resource = resource(uri)?;
    resource.append_path("api/convert");

    let response = Client::new()
        .post(resource.to_string())
        .json(request)
        .send()
        .await?;
    read_reply(response).await
}

pub async fn batch(uri: &str, request: &BatchRequest) -> Result<BatchReply> {
    let mut resource = resource(uri)?;
    resource.append_path("api/batch");

    let response = Client::new()
        .post(resource.to_string())
        .json(request)
        .send()
        .await?;
    read_reply(response).await
}

pub async fn list_files(uri: &str, prefix: Option<&str>, limit: Option<usize>) -> Result<FileList> {
    let mut resource = resource(uri)?;
    resource.append_path("api/files");
    if let Some(prefix) = prefix {
        resource.append_query("prefix", prefix);
    }
    if let Some(limit) = limit {
        resource.append_query("limit", &limit.to_string());
    }

    let response = Client::new().get(resource.to_string()).send().await?;
    read_reply(response).await
}

/// Streams an object into `output` and returns the number of bytes written.
pub async fn download(uri: &str, key: &str, output: &Path) -> Result<u64> {
    let mut resource = resource(uri)?;
    resource.append_path("api/download").append_key(key);

    let mut response = Client::new().get(resource.to_string()).send().await?;
    if !response.status().is_success() {
        return Err(status_error(response).await);
    }

    let mut file = File::create(output).await?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

pub async fn delete_file(uri: &str, key: &str) -> Result<DeleteReply> {
    let mut resource = resource(uri)?;
    resource.append_path("api/file").append_key(key);

    let response = Client::new().delete(resource.to_string()).send().await?;
    read_reply(response).await
}

fn resource(uri: &str) -> Result<Resource> {
    Resource::new(uri).ok_or_else(|| ClientError::Uri(uri.to_owned()))
}

async fn read_reply<T: DeserializeOwned>(response: Response) -> Result<T> {
    if response.status().is_success() {
        Ok(response.json().await?)
    } else {
        Err(status_error(response).await)
    }
}

async fn status_error(response: Response) -> ClientError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body).map_or(body, |e| e.error);
    ClientError::Status { status, message }
}

fn mime_type_of(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" | "jfif" => "image/jpeg",
        "png" => "image/png",
        "bmp" => "image/bmp",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => OCTET_STREAM,
    }
}
