use std::io::Cursor;

use image::DynamicImage;

/// Orientation value meaning "no transform needed".
pub const NORMAL: u8 = 1;

/// Reads the EXIF orientation tag (1 to 8) of an encoded image.
///
/// Images without EXIF data or with an out of range value report [`NORMAL`].
#[must_use]
pub fn read_exif_orientation(data: &[u8]) -> u8 {
    let mut cursor = Cursor::new(data);
    let Ok(exif) = exif::Reader::new().read_from_container(&mut cursor) else {
        return NORMAL;
    };
    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .and_then(|v| u8::try_from(v).ok())
        .filter(|v| (1..=8).contains(v))
        .unwrap_or(NORMAL)
}

/// Rotates and mirrors `img` so that it displays upright for the given orientation.
#[must_use]
pub fn apply_orientation(img: DynamicImage, orientation: u8) -> DynamicImage {
    tracing::debug!(orientation, "applying EXIF orientation");
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, ImageFormat, Rgba, RgbaImage};
    use rstest::rstest;

    /// 2x1 image with a red left pixel and a blue right pixel.
    fn two_pixels() -> DynamicImage {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        img.put_pixel(1, 0, Rgba([0, 0, 255, 255]));
        DynamicImage::ImageRgba8(img)
    }

    #[rstest]
    #[case(1, (2, 1))]
    #[case(2, (2, 1))]
    #[case(3, (2, 1))]
    #[case(4, (2, 1))]
    #[case(5, (1, 2))]
    #[case(6, (1, 2))]
    #[case(7, (1, 2))]
    #[case(8, (1, 2))]
    #[case(42, (2, 1))]
    #[trace]
    fn apply_orientation_dimensions(#[case] orientation: u8, #[case] expected: (u32, u32)) {
        // Act
        let rotated = apply_orientation(two_pixels(), orientation);

        // Assert
        assert_eq!(rotated.dimensions(), expected);
    }

    #[test]
    fn mirror_swaps_pixels() {
        // Act
        let mirrored = apply_orientation(two_pixels(), 2);

        // Assert
        assert_eq!(mirrored.get_pixel(0, 0), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn rotate_clockwise_puts_left_on_top() {
        // Act
        let rotated = apply_orientation(two_pixels(), 6);

        // Assert
        assert_eq!(rotated.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(rotated.get_pixel(0, 1), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn image_without_exif_is_normal() {
        // Arrange
        let mut buffer = Vec::new();
        two_pixels()
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();

        // Act
        let orientation = read_exif_orientation(&buffer);

        // Assert
        assert_eq!(orientation, NORMAL);
    }

    #[test]
    fn garbage_is_normal() {
        assert_eq!(read_exif_orientation(b"not an image"), NORMAL);
    }
}
