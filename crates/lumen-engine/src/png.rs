//! Diagnostic frame export.
//!
//! Converts packed 32-bit pixels read back from a blue-first colour attachment
//! into an 8-bit RGBA PNG byte stream.

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};

use crate::value::ScalarValue;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("expected {expected} pixels for a {width}x{height} image, got {actual}")]
    PixelCountMismatch {
        width: u32,
        height: u32,
        expected: u64,
        actual: usize,
    },
    #[error("png encoder failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Encodes `pixels` (row-major, `width * height` entries) as a PNG.
///
/// Each pixel's [`ScalarValue::as_u32`] holds bytes `b0..b3` from least to
/// most significant. They are written as `R = b2, G = b1, B = b0, A = b3`,
/// which turns a BGRA attachment into RGBA output.
pub fn encode_png(width: u32, height: u32, pixels: &[ScalarValue]) -> Result<Vec<u8>, EncodeError> {
    let expected = u64::from(width) * u64::from(height);
    if pixels.len() as u64 != expected {
        return Err(EncodeError::PixelCountMismatch {
            width,
            height,
            expected,
            actual: pixels.len(),
        });
    }

    let mut rgba = Vec::with_capacity(pixels.len() * 4);
    for pixel in pixels {
        let [b0, b1, b2, b3] = pixel.as_u32().to_le_bytes();
        rgba.extend_from_slice(&[b2, b1, b0, b3]);
    }

    let mut out = Vec::new();
    PngEncoder::new(&mut out).write_image(&rgba, width, height, ExtendedColorType::Rgba8)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> image::RgbaImage {
        image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
            .expect("valid png")
            .to_rgba8()
    }

    #[test]
    fn swaps_red_and_blue_channels() {
        let pixels = [
            ScalarValue::integer(0xAABB_CCDD),
            ScalarValue::integer(0x1122_3344),
        ];
        let png = encode_png(2, 1, &pixels).unwrap();
        let img = decode(&png);

        // Little-endian bytes of 0xAABBCCDD are DD CC BB AA; byte 2 becomes red.
        assert_eq!(img.dimensions(), (2, 1));
        assert_eq!(img.get_pixel(0, 0).0, [0xBB, 0xCC, 0xDD, 0xAA]);
        assert_eq!(img.get_pixel(1, 0).0, [0x22, 0x33, 0x44, 0x11]);
    }

    #[test]
    fn header_is_8bit_rgba_non_interlaced() {
        let png = encode_png(1, 1, &[ScalarValue::integer(0)]).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        assert_eq!(&png[12..16], b"IHDR");
        assert_eq!(png[24], 8, "bit depth");
        assert_eq!(png[25], 6, "colour type RGBA");
        assert_eq!(png[28], 0, "interlace method");
    }

    #[test]
    fn rows_are_row_major() {
        // 1x2: top pixel opaque red (BGRA 0xFFFF0000), bottom opaque blue.
        let pixels = [
            ScalarValue::integer(0xFFFF_0000),
            ScalarValue::integer(0xFF00_00FF),
        ];
        let img = decode(&encode_png(1, 2, &pixels).unwrap());
        assert_eq!(img.get_pixel(0, 0).0, [0xFF, 0x00, 0x00, 0xFF]);
        assert_eq!(img.get_pixel(0, 1).0, [0x00, 0x00, 0xFF, 0xFF]);
    }

    #[test]
    fn too_few_pixels_is_rejected() {
        let err = encode_png(2, 2, &[ScalarValue::integer(0); 3]).unwrap_err();
        match err {
            EncodeError::PixelCountMismatch { expected, actual, .. } => {
                assert_eq!(expected, 4);
                assert_eq!(actual, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn too_many_pixels_is_rejected() {
        let err = encode_png(1, 1, &[ScalarValue::integer(0); 2]).unwrap_err();
        assert!(err.to_string().contains("expected 1 pixels"));
    }

    #[test]
    fn oversized_dimensions_do_not_overflow() {
        let err = encode_png(u32::MAX, u32::MAX, &[]).unwrap_err();
        assert!(matches!(err, EncodeError::PixelCountMismatch { actual: 0, .. }));
    }

    #[test]
    fn float_tagged_pixels_use_their_bit_pattern() {
        // 1.0 has zero low 32 bits, so the pixel is transparent black.
        let img = decode(&encode_png(1, 1, &[ScalarValue::float(1.0)]).unwrap());
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0, 0]);
    }
}
