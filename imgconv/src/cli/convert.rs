use std::path::{Path, PathBuf};

use comfy_table::{presets::UTF8_HORIZONTAL_ONLY, Attribute, Cell, ContentArrangement, Table};
use converter::ConvertOptions;
use futures::future::join_all;

pub struct ConvertParams {
    pub files: Vec<PathBuf>,
    pub output: PathBuf,
    pub options: ConvertOptions,
}

struct Outcome {
    source: PathBuf,
    result: Result<Written, String>,
}

struct Written {
    path: PathBuf,
    size: usize,
    width: u32,
    height: u32,
}

/// Converts local files concurrently and prints a summary.
///
/// Returns `false` if any file failed.
pub async fn run(params: ConvertParams) -> bool {
    if let Err(e) = tokio::fs::create_dir_all(&params.output).await {
        eprintln!("cannot create {}: {e}", params.output.display());
        return false;
    }

    let tasks = params.files.into_iter().map(|source| {
        let output = params.output.clone();
        let options = params.options.clone();
        async move {
            let path = source.clone();
            let result = tokio::task::spawn_blocking(move || convert_file(&path, &output, &options))
                .await
                .unwrap_or_else(|e| Err(e.to_string()));
            Outcome { source, result }
        }
    });
    let outcomes = join_all(tasks).await;

    println!("{}", summary(&outcomes));
    outcomes.iter().all(|o| o.result.is_ok())
}

fn convert_file(source: &Path, output: &Path, options: &ConvertOptions) -> Result<Written, String> {
    let data = std::fs::read(source).map_err(|e| e.to_string())?;
    let converted = converter::convert(&data, options).map_err(|e| e.to_string())?;
    let path = output_path(source, output, options.format.extension());
    std::fs::write(&path, &converted.data).map_err(|e| e.to_string())?;
    Ok(Written {
        path,
        size: converted.size(),
        width: converted.width,
        height: converted.height,
    })
}

fn output_path(source: &Path, output: &Path, extension: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "converted".to_owned());
    output.join(format!("{stem}.{extension}"))
}

fn summary(outcomes: &[Outcome]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_HORIZONTAL_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120)
        .set_header(vec![
            Cell::new("Source").add_attribute(Attribute::Bold),
            Cell::new("Result").add_attribute(Attribute::Bold),
            Cell::new("Size").add_attribute(Attribute::Bold),
            Cell::new("Dimensions").add_attribute(Attribute::Bold),
        ]);

    for o in outcomes {
        let row = match &o.result {
            Ok(w) => vec![
                Cell::new(o.source.display()),
                Cell::new(w.path.display()),
                Cell::new(w.size),
                Cell::new(format!("{}x{}", w.width, w.height)),
            ],
            Err(e) => vec![
                Cell::new(o.source.display()),
                Cell::new(format!("failed: {e}")),
                Cell::new(""),
                Cell::new(""),
            ],
        };
        table.add_row(row);
    }
    table
}
