//! Object key naming.

use converter::OutputFormat;
use kernel::{file_name_from_key, CONVERTED_PREFIX, UPLOADS_PREFIX};

const DEFAULT_UPLOAD_NAME: &str = "upload";
const DEFAULT_CONVERTED_STEM: &str = "converted";

/// `uploads/<millis>-<file name>`. Directory parts of the client supplied name are dropped.
pub fn upload_key(file_name: &str, now_millis: i64) -> String {
    let name = file_name_from_key(file_name);
    let name = if name.is_empty() {
        DEFAULT_UPLOAD_NAME
    } else {
        name
    };
    format!("{UPLOADS_PREFIX}{now_millis}-{name}")
}

/// `converted/<millis>-<stem>.<ext>` where the stem is the last segment of
/// `source` up to its first dot.
pub fn converted_key(source: &str, format: OutputFormat, now_millis: i64) -> String {
    let stem = file_name_from_key(source)
        .split('.')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_CONVERTED_STEM);
    format!(
        "{CONVERTED_PREFIX}{now_millis}-{stem}.{}",
        format.extension()
    )
}

pub fn batch_id(now_millis: i64) -> String {
    format!("batch-{now_millis}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("cat.jfif", "uploads/42-cat.jfif")]
    #[case("../../etc/passwd", "uploads/42-passwd")]
    #[case("dir\\photo.png", "uploads/42-photo.png")]
    #[case("", "uploads/42-upload")]
    #[trace]
    fn upload_keys(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(upload_key(name, 42), expected);
    }

    #[rstest]
    #[case("uploads/1-cat.jfif", OutputFormat::Jpg, "converted/7-1-cat.jpg")]
    #[case("uploads/1-cat.tar.png", OutputFormat::WebP, "converted/7-1-cat.webp")]
    #[case("photo", OutputFormat::Png, "converted/7-photo.png")]
    #[case("uploads/.hidden", OutputFormat::Gif, "converted/7-converted.gif")]
    #[case("", OutputFormat::Bmp, "converted/7-converted.bmp")]
    #[trace]
    fn converted_keys(#[case] source: &str, #[case] format: OutputFormat, #[case] expected: &str) {
        assert_eq!(converted_key(source, format, 7), expected);
    }

    #[test]
    fn batch_ids() {
        assert_eq!(batch_id(1_700_000_000_000), "batch-1700000000000");
    }
}
