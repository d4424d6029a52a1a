use thiserror::Error;

use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum ImageDecodeError {
    #[error("image data is empty")]
    EmptyData,
    #[error("failed to decode image: {0}")]
    DecodeFailed(#[source] image::ImageError),
}

/// Decodes an in-memory raster image (format sniffed from magic bytes)
/// into an RGB frame.
///
/// Greyscale, alpha and 16-bit inputs are converted to 8-bit RGB.
pub fn decode_image_bytes(bytes: &[u8]) -> Result<Frame, ImageDecodeError> {
    if bytes.is_empty() {
        return Err(ImageDecodeError::EmptyData);
    }
    let image = image::load_from_memory(bytes).map_err(ImageDecodeError::DecodeFailed)?;
    Ok(Frame::from_rgb_image(image.into_rgb8()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, ImageFormat, RgbaImage};
    use std::io::Cursor;

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_decodes_png_to_rgb() {
        let rgba = RgbaImage::from_pixel(4, 2, image::Rgba([10, 20, 30, 128]));
        let bytes = encode(DynamicImage::ImageRgba8(rgba), ImageFormat::Png);

        let frame = decode_image_bytes(&bytes).unwrap();

        assert_eq!((frame.width(), frame.height()), (4, 2));
        assert_eq!(frame.data().len(), 4 * 2 * 3);
        assert_eq!(&frame.data()[..3], &[10, 20, 30]);
    }

    #[test]
    fn test_grey_input_expands_to_three_channels() {
        let grey = GrayImage::from_pixel(3, 3, image::Luma([200]));
        let bytes = encode(DynamicImage::ImageLuma8(grey), ImageFormat::Png);

        let frame = decode_image_bytes(&bytes).unwrap();

        assert_eq!(&frame.data()[..3], &[200, 200, 200]);
    }

    #[test]
    fn test_decodes_jpeg() {
        let rgb = image::RgbImage::from_pixel(16, 8, image::Rgb([255, 0, 0]));
        let bytes = encode(DynamicImage::ImageRgb8(rgb), ImageFormat::Jpeg);

        let frame = decode_image_bytes(&bytes).unwrap();

        assert_eq!((frame.width(), frame.height()), (16, 8));
    }

    #[test]
    fn test_empty_input_is_rejected() {
        assert!(matches!(
            decode_image_bytes(&[]),
            Err(ImageDecodeError::EmptyData)
        ));
    }

    #[test]
    fn test_corrupt_bytes_fail_to_decode() {
        let result = decode_image_bytes(b"definitely not an image");
        assert!(matches!(result, Err(ImageDecodeError::DecodeFailed(_))));
    }

    #[test]
    fn test_truncated_png_fails_to_decode() {
        let rgb = image::RgbImage::from_pixel(32, 32, image::Rgb([1, 2, 3]));
        let bytes = encode(DynamicImage::ImageRgb8(rgb), ImageFormat::Png);

        let result = decode_image_bytes(&bytes[..bytes.len() / 2]);

        assert!(result.is_err());
    }
}
