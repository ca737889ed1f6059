use std::str::FromStr;

use crate::ConvertError;
use crate::format::OutputFormat;

const DEFAULT_QUALITY: f32 = 0.92;

/// Target size of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resize {
    #[default]
    Original,
    /// 25% of the source
    Small,
    /// 50% of the source
    Medium,
    /// 75% of the source
    Large,
    /// Explicit size. A missing or zero side is derived from the source.
    Custom {
        width: Option<u32>,
        height: Option<u32>,
    },
}

impl Resize {
    #[must_use]
    pub fn custom(width: Option<u32>, height: Option<u32>) -> Self {
        Resize::Custom { width, height }
    }

    /// Computes output dimensions for a `width` x `height` source.
    #[must_use]
    pub fn target_size(self, width: u32, height: u32, keep_aspect_ratio: bool) -> (u32, u32) {
        let scale = match self {
            Resize::Original => return (width, height),
            Resize::Small => 0.25,
            Resize::Medium => 0.5,
            Resize::Large => 0.75,
            Resize::Custom {
                width: w,
                height: h,
            } => return custom_size(width, height, w, h, keep_aspect_ratio),
        };
        (scaled(width, scale), scaled(height, scale))
    }
}

fn scaled(side: u32, scale: f64) -> u32 {
    ((f64::from(side) * scale).round() as u32).max(1)
}

fn custom_size(
    width: u32,
    height: u32,
    requested_width: Option<u32>,
    requested_height: Option<u32>,
    keep_aspect_ratio: bool,
) -> (u32, u32) {
    let requested_width = requested_width.filter(|w| *w > 0);
    let requested_height = requested_height.filter(|h| *h > 0);
    let ratio = f64::from(width) / f64::from(height.max(1));

    match (requested_width, requested_height) {
        (None, None) => (width, height),
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) if keep_aspect_ratio => (w, scaled(w, 1.0 / ratio)),
        (Some(w), None) => (w, height),
        (None, Some(h)) if keep_aspect_ratio => (scaled(h, ratio), h),
        (None, Some(h)) => (width, h),
    }
}

impl FromStr for Resize {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "original" => Ok(Resize::Original),
            "small" => Ok(Resize::Small),
            "medium" => Ok(Resize::Medium),
            "large" => Ok(Resize::Large),
            _ => Err(ConvertError::UnknownResize(s.to_owned())),
        }
    }
}

/// Coarse compression preset applied on top of the requested quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionLevel {
    None,
    Low,
    Medium,
    High,
}

impl CompressionLevel {
    fn adjust(self, quality: f32) -> f32 {
        match self {
            CompressionLevel::None => quality.max(0.95),
            CompressionLevel::Low => quality.max(0.85),
            CompressionLevel::Medium => (quality * 0.9).max(0.7),
            CompressionLevel::High => (quality * 0.8).max(0.5),
        }
    }
}

impl FromStr for CompressionLevel {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(CompressionLevel::None),
            "low" => Ok(CompressionLevel::Low),
            "medium" => Ok(CompressionLevel::Medium),
            "high" => Ok(CompressionLevel::High),
            _ => Err(ConvertError::UnknownCompressionLevel(s.to_owned())),
        }
    }
}

/// Parameters of a single conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertOptions {
    pub format: OutputFormat,
    /// Requested quality in `0..=100`
    pub quality: Option<u32>,
    pub resize: Resize,
    pub maintain_aspect_ratio: bool,
    pub compression_level: Option<CompressionLevel>,
    /// Apply the EXIF orientation of the source before resizing
    pub auto_rotate: bool,
    /// Drop source metadata. Re-encoding never copies metadata so this always holds
    pub clear_metadata: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            quality: None,
            resize: Resize::default(),
            maintain_aspect_ratio: true,
            compression_level: None,
            auto_rotate: false,
            clear_metadata: true,
        }
    }
}

impl ConvertOptions {
    #[must_use]
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    /// Encoder quality as a fraction in `0.0..=1.0`.
    #[must_use]
    pub fn quality_fraction(&self) -> f32 {
        let quality = self
            .quality
            .map_or(DEFAULT_QUALITY, |q| q.min(100) as f32 / 100.0);
        self.compression_level
            .map_or(quality, |level| level.adjust(quality))
    }

    pub(crate) fn encoder_quality(&self) -> u8 {
        (self.quality_fraction() * 100.0).round().clamp(1.0, 100.0) as u8
    }
}
