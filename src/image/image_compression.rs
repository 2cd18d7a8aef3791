use image::{ColorType, ImageEncoder, codecs::jpeg::JpegEncoder};

use crate::ml::{
    error::{MlError, MlResult},
    types::{ColorOrder, Frame},
};

pub fn encode_rgb_jpeg(
    rgb_bytes: &[u8],
    width: u32,
    height: u32,
    quality: u8,
) -> MlResult<Vec<u8>> {
    if width == 0 || height == 0 {
        return Err(MlError::Postprocess(
            "cannot encode image with zero width or height".to_string(),
        ));
    }

    let expected_len = width as usize * height as usize * 3;
    if rgb_bytes.len() != expected_len {
        return Err(MlError::Postprocess(format!(
            "invalid RGB buffer length {}, expected {} for {}x{}",
            rgb_bytes.len(),
            expected_len,
            width,
            height
        )));
    }

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, quality)
        .write_image(rgb_bytes, width, height, ColorType::Rgb8.into())
        .map_err(|e| MlError::Postprocess(format!("failed to encode JPEG: {e}")))?;
    Ok(encoded)
}

/// Encodes a frame of either channel order as an RGB JPEG.
pub fn encode_frame_jpeg(frame: &Frame, quality: u8) -> MlResult<Vec<u8>> {
    let rgb = frame.to_order(ColorOrder::Rgb);
    encode_rgb_jpeg(&rgb.pixels, rgb.width(), rgb.height(), quality)
}

#[cfg(test)]
mod tests {
    use image::{GenericImageView, ImageFormat};

    use super::{encode_frame_jpeg, encode_rgb_jpeg};
    use crate::ml::types::{ColorOrder, Frame};

    #[test]
    fn encode_rgb_jpeg_produces_valid_jpeg() {
        let rgb = vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255];
        let encoded = encode_rgb_jpeg(&rgb, 2, 2, 90).expect("jpeg encoding should succeed");

        assert!(!encoded.is_empty());
        image::load_from_memory_with_format(&encoded, ImageFormat::Jpeg)
            .expect("encoded bytes should be valid JPEG");
    }

    #[test]
    fn encode_rgb_jpeg_rejects_invalid_buffer_size() {
        assert!(encode_rgb_jpeg(&[0, 1, 2], 2, 2, 90).is_err());
    }

    #[test]
    fn bgr_frames_are_written_in_rgb_order() {
        let pixels = [0u8, 0, 255].repeat(8 * 8);
        let frame = Frame::new(8, 8, ColorOrder::Bgr, pixels).unwrap();

        let encoded = encode_frame_jpeg(&frame, 95).unwrap();
        let decoded = image::load_from_memory_with_format(&encoded, ImageFormat::Jpeg).unwrap();
        let pixel = decoded.get_pixel(4, 4);

        assert!(pixel[0] > 200);
        assert!(pixel[2] < 60);
    }
}
