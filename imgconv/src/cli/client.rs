use std::path::Path;

use client::ClientError;
use comfy_table::{presets::UTF8_HORIZONTAL_ONLY, Attribute, Cell, ContentArrangement, Table};
use kernel::{
    BatchFile, BatchItemResult, BatchRequest, BatchStatus, ConvertRequest, FileEntry,
    file_name_from_key,
};

pub async fn upload(uri: &str, file: &Path) -> Result<(), ClientError> {
    let reply = client::upload_file(uri, file).await?;
    println!(
        "file {} uploaded. Key: {} Size: {} Type: {}",
        file.display(),
        reply.file_key,
        reply.file_size,
        reply.file_type
    );
    Ok(())
}

pub async fn list(uri: &str, prefix: Option<&str>, limit: Option<usize>) -> Result<(), ClientError> {
    let reply = client::list_files(uri, prefix, limit).await?;
    println!("{}", files_table(&reply.files));
    Ok(())
}

pub async fn download(uri: &str, key: &str, output: &Path) -> Result<(), ClientError> {
    let written = client::download(uri, key, output).await?;
    println!("file {key} saved into {}. Size: {written}", output.display());
    Ok(())
}

pub async fn delete(uri: &str, key: &str) -> Result<(), ClientError> {
    let reply = client::delete_file(uri, key).await?;
    println!("{key}: {}", reply.message);
    Ok(())
}

pub async fn remote_convert(
    uri: &str,
    key: &str,
    format: &str,
    quality: Option<u32>,
) -> Result<(), ClientError> {
    let request = ConvertRequest {
        file_key: Some(key.to_owned()),
        target_format: Some(format.to_owned()),
        quality,
        ..ConvertRequest::default()
    };
    let reply = client::convert(uri, &request).await?;
    println!(
        "file {} converted into {}. Size: {}",
        reply.original_file_key, reply.converted_file_key, reply.size
    );
    if !reply.transcoded {
        println!("source could not be decoded, bytes were stored unchanged");
    }
    Ok(())
}

pub async fn batch(
    uri: &str,
    keys: &[String],
    format: &str,
    quality: Option<u32>,
) -> Result<(), ClientError> {
    let request = batch_request(keys, format, quality);
    let reply = client::batch(uri, &request).await?;
    println!("{}: {}", reply.batch_id, reply.message);
    println!("{}", batch_table(&reply.results));
    Ok(())
}

fn batch_request(keys: &[String], format: &str, quality: Option<u32>) -> BatchRequest {
    let files = keys
        .iter()
        .map(|key| BatchFile {
            file_key: key.clone(),
            file_name: file_name_from_key(key).to_owned(),
        })
        .collect();
    BatchRequest {
        files: Some(files),
        target_format: Some(format.to_owned()),
        quality,
    }
}

fn batch_table(results: &[BatchItemResult]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_HORIZONTAL_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120)
        .set_header(vec![
            Cell::new("Source").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
            Cell::new("Result").add_attribute(Attribute::Bold),
        ]);

    for r in results {
        let (status, result) = match r.status {
            BatchStatus::Success => ("success", r.converted_file_key.as_deref()),
            BatchStatus::Failed => ("failed", r.error.as_deref()),
        };
        table.add_row(vec![
            Cell::new(&r.original_file.file_key),
            Cell::new(status),
            Cell::new(result.unwrap_or_default()),
        ]);
    }
    table
}

fn files_table(files: &[FileEntry]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_HORIZONTAL_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120)
        .set_header(vec![
            Cell::new("Key").add_attribute(Attribute::Bold),
            Cell::new("Size").add_attribute(Attribute::Bold),
            Cell::new("Type").add_attribute(Attribute::Bold),
            Cell::new("Uploaded").add_attribute(Attribute::Bold),
        ]);

    for f in files {
        table.add_row(vec![
            Cell::new(&f.key),
            Cell::new(f.size),
            Cell::new(&f.content_type),
            Cell::new(f.uploaded.format("%Y-%m-%d %H:%M:%S")),
        ]);
    }
    table
}
