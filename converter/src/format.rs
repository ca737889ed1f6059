use std::fmt;
use std::str::FromStr;

use image::ImageFormat;

use crate::ConvertError;

/// Encodings an image can be converted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputFormat {
    #[default]
    Jpg,
    Jpeg,
    Png,
    WebP,
    Bmp,
    Gif,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 6] = [
        OutputFormat::Jpg,
        OutputFormat::Jpeg,
        OutputFormat::Png,
        OutputFormat::WebP,
        OutputFormat::Bmp,
        OutputFormat::Gif,
    ];

    /// Name used in requests, file extensions and MIME subtypes.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpg => "jpg",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
            OutputFormat::Bmp => "bmp",
            OutputFormat::Gif => "gif",
        }
    }

    #[must_use]
    pub fn mime(self) -> &'static str {
        match self {
            OutputFormat::Jpg | OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
            OutputFormat::Bmp => "image/bmp",
            OutputFormat::Gif => "image/gif",
        }
    }

    /// Whether the quality setting changes the encoded output.
    #[must_use]
    pub fn is_lossy(self) -> bool {
        matches!(self, OutputFormat::Jpg | OutputFormat::Jpeg)
    }

    pub(crate) fn image_format(self) -> ImageFormat {
        match self {
            OutputFormat::Jpg | OutputFormat::Jpeg => ImageFormat::Jpeg,
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::WebP => ImageFormat::WebP,
            OutputFormat::Bmp => ImageFormat::Bmp,
            OutputFormat::Gif => ImageFormat::Gif,
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().trim_start_matches('.').to_ascii_lowercase();
        OutputFormat::ALL
            .into_iter()
            .find(|f| f.extension() == normalized)
            .ok_or_else(|| ConvertError::UnknownFormat(s.to_owned()))
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
