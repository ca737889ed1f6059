#![warn(clippy::unwrap_in_result)]
#![warn(clippy::unwrap_used)]

//! Image conversion between JPEG (including JFIF), PNG, WebP, BMP and GIF.
//!
//! A conversion decodes the source, optionally applies its EXIF orientation,
//! resizes it and encodes it into the requested format. Encoding never copies
//! source metadata.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageError};
use thiserror::Error;

mod format;
mod options;
pub mod orientation;

pub use format::OutputFormat;
pub use options::{CompressionLevel, ConvertOptions, Resize};

/// Largest output side in pixels.
pub const MAX_DIMENSION: u32 = 16_384;
/// Largest output area in pixels.
pub const MAX_PIXELS: u64 = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("image cannot be decoded: {0}")]
    Decode(#[source] ImageError),
    #[error("image cannot be encoded as {format}: {source}")]
    Encode {
        format: OutputFormat,
        #[source]
        source: ImageError,
    },
    #[error("unsupported target format: {0}")]
    UnknownFormat(String),
    #[error("unknown resize preset: {0}")]
    UnknownResize(String),
    #[error("unknown compression level: {0}")]
    UnknownCompressionLevel(String),
    #[error("output size {width}x{height} exceeds the limit")]
    TooLarge { width: u32, height: u32 },
}

/// Encoded result of a conversion.
#[derive(Debug, Clone)]
pub struct Converted {
    pub data: Vec<u8>,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
}

impl Converted {
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn mime(&self) -> &'static str {
        self.format.mime()
    }
}

/// Converts an encoded image according to `options`.
///
/// The source format is sniffed from the content, so JFIF files and JPEG
/// files with any extension are both read as JPEG.
///
/// # Errors
///
/// Fails when the source cannot be decoded or the result cannot be encoded.
pub fn convert(data: &[u8], options: &ConvertOptions) -> Result<Converted, ConvertError> {
    let mut img = image::load_from_memory(data).map_err(ConvertError::Decode)?;

    if options.auto_rotate {
        let orientation = orientation::read_exif_orientation(data);
        if orientation != orientation::NORMAL {
            img = orientation::apply_orientation(img, orientation);
        }
    }

    let (source_width, source_height) = img.dimensions();
    let (width, height) =
        options
            .resize
            .target_size(source_width, source_height, options.maintain_aspect_ratio);
    check_size(width, height)?;

    if (width, height) != (source_width, source_height) {
        img = img.resize_exact(width, height, FilterType::Triangle);
    }

    tracing::debug!(
        source_width,
        source_height,
        width,
        height,
        format = %options.format,
        "converting image"
    );
    if !options.clear_metadata {
        tracing::debug!("source metadata is not carried over by re-encoding");
    }

    let data = encode(&img, options)?;
    Ok(Converted {
        data,
        format: options.format,
        width,
        height,
    })
}

/// Rejects outputs whose pixel buffer would not fit in memory.
///
/// # Errors
///
/// Fails when a side exceeds [`MAX_DIMENSION`] or the area exceeds [`MAX_PIXELS`].
pub fn check_size(width: u32, height: u32) -> Result<(), ConvertError> {
    if width > MAX_DIMENSION
        || height > MAX_DIMENSION
        || u64::from(width) * u64::from(height) > MAX_PIXELS
    {
        return Err(ConvertError::TooLarge { width, height });
    }
    Ok(())
}

fn encode(img: &DynamicImage, options: &ConvertOptions) -> Result<Vec<u8>, ConvertError> {
    let format = options.format;
    let (width, height) = img.dimensions();
    let mut buffer = Vec::with_capacity((width as usize) * (height as usize) / 4);

    let result = match format {
        OutputFormat::Jpg | OutputFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buffer, options.encoder_quality());
            // JPEG has no alpha channel
            DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)
        }
        OutputFormat::Png => img.write_to(&mut Cursor::new(&mut buffer), format.image_format()),
        // The WebP, BMP and GIF encoders only accept 8-bit RGB(A) input
        OutputFormat::WebP | OutputFormat::Bmp | OutputFormat::Gif => {
            DynamicImage::ImageRgba8(img.to_rgba8())
                .write_to(&mut Cursor::new(&mut buffer), format.image_format())
        }
    };

    result.map_err(|source| ConvertError::Encode { format, source })?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
    use rstest::rstest;

    /// Noisy gradient that compresses like a photograph rather than a flat fill.
    fn photo(width: u32, height: u32) -> DynamicImage {
        let mut state: u32 = 0x9E37_79B9;
        let img = RgbImage::from_fn(width, height, |x, y| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let noise = (state % 48) as u8;
            Rgb([
                ((x * 255 / width.max(1)) as u8).saturating_add(noise),
                ((y * 255 / height.max(1)) as u8).saturating_add(noise / 2),
                (((x + y) % 256) as u8) ^ noise,
            ])
        });
        DynamicImage::ImageRgb8(img)
    }

    fn encoded(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), format).unwrap();
        buffer
    }

    #[test]
    fn square_custom_resize_keeps_requested_size() {
        // Arrange
        let source = encoded(&photo(100, 100), ImageFormat::Png);
        let options = ConvertOptions {
            resize: Resize::custom(Some(50), Some(50)),
            maintain_aspect_ratio: true,
            ..ConvertOptions::new(OutputFormat::Jpg)
        };

        // Act
        let converted = convert(&source, &options).unwrap();

        // Assert
        assert_eq!((converted.width, converted.height), (50, 50));
        let decoded = image::load_from_memory(&converted.data).unwrap();
        assert_eq!(decoded.dimensions(), (50, 50));
    }

    #[test]
    fn lower_quality_is_never_larger() {
        // Arrange
        let source = encoded(&photo(256, 256), ImageFormat::Png);
        let low = ConvertOptions {
            quality: Some(10),
            ..ConvertOptions::new(OutputFormat::Jpg)
        };
        let high = ConvertOptions {
            quality: Some(90),
            ..ConvertOptions::new(OutputFormat::Jpg)
        };

        // Act
        let low = convert(&source, &low).unwrap();
        let high = convert(&source, &high).unwrap();

        // Assert
        assert!(low.size() <= high.size(), "{} > {}", low.size(), high.size());
    }

    #[rstest]
    #[case(OutputFormat::Jpg, ImageFormat::Jpeg)]
    #[case(OutputFormat::Jpeg, ImageFormat::Jpeg)]
    #[case(OutputFormat::Png, ImageFormat::Png)]
    #[case(OutputFormat::WebP, ImageFormat::WebP)]
    #[case(OutputFormat::Bmp, ImageFormat::Bmp)]
    #[case(OutputFormat::Gif, ImageFormat::Gif)]
    #[trace]
    fn output_has_requested_format(#[case] format: OutputFormat, #[case] expected: ImageFormat) {
        // Arrange
        let source = encoded(&photo(32, 24), ImageFormat::Png);

        // Act
        let converted = convert(&source, &ConvertOptions::new(format)).unwrap();

        // Assert
        assert_eq!(image::guess_format(&converted.data).unwrap(), expected);
        assert_eq!((converted.width, converted.height), (32, 24));
    }

    #[test]
    fn jfif_source_is_read_as_jpeg() {
        // Arrange
        let source = encoded(&photo(40, 30), ImageFormat::Jpeg);

        // Act
        let converted = convert(&source, &ConvertOptions::new(OutputFormat::Png)).unwrap();

        // Assert
        assert_eq!(converted.mime(), "image/png");
        assert_eq!((converted.width, converted.height), (40, 30));
    }

    #[test]
    fn transparent_source_converts_to_jpeg() {
        // Arrange
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([10, 20, 30, 0])));
        let source = encoded(&img, ImageFormat::Png);

        // Act
        let converted = convert(&source, &ConvertOptions::new(OutputFormat::Jpeg));

        // Assert
        assert!(converted.is_ok());
    }

    #[test]
    fn preset_resize_scales_both_sides() {
        // Arrange
        let source = encoded(&photo(200, 100), ImageFormat::Png);
        let options = ConvertOptions {
            resize: Resize::Medium,
            ..ConvertOptions::new(OutputFormat::Png)
        };

        // Act
        let converted = convert(&source, &options).unwrap();

        // Assert
        assert_eq!((converted.width, converted.height), (100, 50));
    }

    #[test]
    fn garbage_fails_to_decode() {
        // Act
        let result = convert(b"definitely not an image", &ConvertOptions::default());

        // Assert
        assert!(matches!(result, Err(ConvertError::Decode(_))));
    }

    #[rstest]
    #[case(4, 4, Resize::custom(Some(400_000), Some(400_000)))]
    #[case(4, 4, Resize::custom(Some(16_385), None))]
    #[case(1, 100, Resize::custom(Some(1_000), None))]
    #[case(4, 4, Resize::custom(Some(16_384), Some(16_384)))]
    #[trace]
    fn oversized_target_is_rejected(
        #[case] width: u32,
        #[case] height: u32,
        #[case] resize: Resize,
    ) {
        // Arrange
        let source = encoded(&photo(width, height), ImageFormat::Png);
        let options = ConvertOptions {
            resize,
            ..ConvertOptions::new(OutputFormat::Png)
        };

        // Act
        let result = convert(&source, &options);

        // Assert
        assert!(matches!(result, Err(ConvertError::TooLarge { .. })));
    }

    #[rstest]
    #[case(16_384, 4_096, true)]
    #[case(8_192, 8_192, true)]
    #[case(16_384, 4_097, false)]
    #[case(16_385, 1, false)]
    #[case(1, 16_385, false)]
    #[trace]
    fn size_limits(#[case] width: u32, #[case] height: u32, #[case] allowed: bool) {
        assert_eq!(check_size(width, height).is_ok(), allowed);
    }
}
