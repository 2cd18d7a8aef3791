use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image as FirImage, ImageRef as FirImageRef, TypedImage, TypedImageRef},
    pixels::F32x3,
};
use ndarray::Array4;

use crate::ml::{
    error::{MlError, MlResult},
    runtime::{Normalization, Precision},
    types::{ColorOrder, FaceBox, FaceDetection, Frame},
};

pub const FACE_INPUT_SIZE: usize = 224;

const YOLO_INPUT_WIDTH: usize = 640;
const YOLO_INPUT_HEIGHT: usize = 640;
const PAD_VALUE: f32 = 114.0;

pub fn preprocess_yolo(frame: &Frame) -> MlResult<(Vec<f32>, usize, usize)> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(MlError::Preprocess(
            "frame dimensions cannot be zero".to_string(),
        ));
    }
    let frame = frame.to_order(ColorOrder::Rgb);

    let src_w = frame.width() as f32;
    let src_h = frame.height() as f32;
    let scale = (YOLO_INPUT_WIDTH as f32 / src_w).min(YOLO_INPUT_HEIGHT as f32 / src_h);
    let scaled_width = (src_w * scale).round().clamp(0.0, YOLO_INPUT_WIDTH as f32) as usize;
    let scaled_height = (src_h * scale).round().clamp(0.0, YOLO_INPUT_HEIGHT as f32) as usize;

    let mut output = vec![0f32; 3 * YOLO_INPUT_WIDTH * YOLO_INPUT_HEIGHT];
    let green_offset = YOLO_INPUT_WIDTH * YOLO_INPUT_HEIGHT;
    let blue_offset = 2 * YOLO_INPUT_WIDTH * YOLO_INPUT_HEIGHT;

    for y in 0..YOLO_INPUT_HEIGHT {
        for x in 0..YOLO_INPUT_WIDTH {
            let idx = y * YOLO_INPUT_WIDTH + x;
            let rgb = if x >= scaled_width || y >= scaled_height {
                [PAD_VALUE, PAD_VALUE, PAD_VALUE]
            } else {
                sample_bilinear_rgb(&frame, x as f32 / scale, y as f32 / scale)
            };
            output[idx] = rgb[0] / 255.0;
            output[idx + green_offset] = rgb[1] / 255.0;
            output[idx + blue_offset] = rgb[2] / 255.0;
        }
    }

    Ok((output, scaled_width, scaled_height))
}

/// Builds the classifier input batch: one normalized `3x224x224` entry per
/// detection, in detection order. Degenerate crops become black faces so the
/// batch stays aligned with `faces`.
pub fn preprocess_faces(
    frames: &[Frame],
    faces: &[FaceDetection],
    normalization: &Normalization,
    precision: Precision,
) -> MlResult<Array4<f32>> {
    let mut batch = Array4::<f32>::zeros((faces.len(), 3, FACE_INPUT_SIZE, FACE_INPUT_SIZE));
    let mut resizer = Resizer::new();

    for (index, face) in faces.iter().enumerate() {
        let crop = match frames.get(face.frame_index) {
            Some(frame) => {
                let bounds = face.bounds.clamp_to(&frame.dimensions);
                if bounds.is_empty() {
                    None
                } else {
                    Some(crop_and_resize_face(frame, &bounds, &mut resizer)?)
                }
            }
            None => None,
        };

        for c in 0..3 {
            let mean = normalization.mean[c];
            let std = normalization.std[c];
            for y in 0..FACE_INPUT_SIZE {
                for x in 0..FACE_INPUT_SIZE {
                    let raw = crop
                        .as_ref()
                        .map(|pixels| pixels[(y * FACE_INPUT_SIZE + x) * 3 + c] as f32)
                        .unwrap_or(0.0);
                    batch[[index, c, y, x]] = (raw / 255.0 - mean) / std;
                }
            }
        }
    }

    if precision == Precision::Half {
        quantize_half(&mut batch);
    }
    Ok(batch)
}

/// Rounds every value through IEEE binary16 and back.
pub fn quantize_half<D: ndarray::Dimension>(values: &mut ndarray::Array<f32, D>) {
    values.mapv_inplace(|v| half::f16::from_f32(v).to_f32());
}

fn crop_and_resize_face(
    frame: &Frame,
    bounds: &FaceBox,
    resizer: &mut Resizer,
) -> MlResult<Vec<u8>> {
    let frame = frame.to_order(ColorOrder::Rgb);
    let source = FirImageRef::new(
        frame.width(),
        frame.height(),
        frame.pixels.as_slice(),
        PixelType::U8x3,
    )
    .map_err(|e| MlError::Preprocess(format!("invalid frame buffer: {e}")))?;

    let mut resized = FirImage::new(
        FACE_INPUT_SIZE as u32,
        FACE_INPUT_SIZE as u32,
        PixelType::U8x3,
    );
    let options = ResizeOptions::new()
        .crop(
            bounds.left as f64,
            bounds.top as f64,
            bounds.width() as f64,
            bounds.height() as f64,
        )
        .resize_alg(ResizeAlg::Convolution(FilterType::Box));
    resizer
        .resize(&source, &mut resized, Some(&options))
        .map_err(|e| MlError::Preprocess(format!("failed to resize face crop: {e}")))?;
    Ok(resized.into_vec())
}

/// Area-style resize of an interleaved `f32` RGB buffer. Values are not
/// quantized.
pub fn resize_rgb_f32_area(
    rgb: &[f32],
    width: u32,
    height: u32,
    target_width: u32,
    target_height: u32,
) -> MlResult<Vec<f32>> {
    let pixels: Vec<F32x3> = rgb
        .chunks_exact(3)
        .map(|p| F32x3::new([p[0], p[1], p[2]]))
        .collect();
    let source = TypedImageRef::new(width, height, &pixels)
        .map_err(|e| MlError::Postprocess(format!("invalid f32 RGB buffer: {e}")))?;
    let mut resized = TypedImage::<F32x3>::new(target_width, target_height);
    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Box));
    Resizer::new()
        .resize_typed(&source, &mut resized, &options)
        .map_err(|e| MlError::Postprocess(format!("failed to resize f32 RGB buffer: {e}")))?;
    Ok(resized.pixels().iter().flat_map(|p| p.0).collect())
}

fn sample_bilinear_rgb(frame: &Frame, fx: f32, fy: f32) -> [f32; 3] {
    let max_x = (frame.width().saturating_sub(1)) as f32;
    let max_y = (frame.height().saturating_sub(1)) as f32;
    let fx = fx.clamp(0.0, max_x);
    let fy = fy.clamp(0.0, max_y);

    let x0 = fx.floor() as i32;
    let x1 = fx.ceil() as i32;
    let y0 = fy.floor() as i32;
    let y1 = fy.ceil() as i32;
    let dx = fx - x0 as f32;
    let dy = fy - y0 as f32;
    let dx1 = 1.0 - dx;
    let dy1 = 1.0 - dy;

    let p1 = read_rgb(frame, x0, y0);
    let p2 = read_rgb(frame, x1, y0);
    let p3 = read_rgb(frame, x0, y1);
    let p4 = read_rgb(frame, x1, y1);

    let blend = |v1: f32, v2: f32, v3: f32, v4: f32| -> f32 {
        v1 * dx1 * dy1 + v2 * dx * dy1 + v3 * dx1 * dy + v4 * dx * dy
    };

    [
        blend(p1[0], p2[0], p3[0], p4[0]),
        blend(p1[1], p2[1], p3[1], p4[1]),
        blend(p1[2], p2[2], p3[2], p4[2]),
    ]
}

fn read_rgb(frame: &Frame, x: i32, y: i32) -> [f32; 3] {
    let width = frame.width() as i32;
    let height = frame.height() as i32;
    if x < 0 || y < 0 || x >= width || y >= height {
        return [PAD_VALUE, PAD_VALUE, PAD_VALUE];
    }

    let [r, g, b] = frame.pixel(x as u32, y as u32);
    [r as f32, g as f32, b as f32]
}

#[cfg(test)]
mod tests {
    use super::{FACE_INPUT_SIZE, preprocess_faces, preprocess_yolo, resize_rgb_f32_area};
    use crate::ml::{
        runtime::{Normalization, Precision},
        types::{FaceBox, FaceDetection, Frame},
    };

    fn uniform_frame(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        let pixels = rgb
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        Frame::from_rgb(width, height, pixels).expect("valid frame")
    }

    fn detection(
        frame_index: usize,
        left: u32,
        top: u32,
        right: u32,
        bottom: u32,
    ) -> FaceDetection {
        FaceDetection {
            bounds: FaceBox {
                top,
                right,
                bottom,
                left,
            },
            frame_index,
        }
    }

    #[test]
    fn preprocess_faces_keeps_one_entry_per_detection() {
        let frames = vec![
            uniform_frame(64, 48, [255, 0, 0]),
            uniform_frame(64, 48, [0, 0, 255]),
        ];
        let faces = vec![
            detection(1, 4, 4, 40, 40),
            detection(0, 10, 10, 30, 30),
            detection(1, 0, 0, 0, 10),
        ];

        let batch = preprocess_faces(
            &frames,
            &faces,
            &Normalization::default(),
            Precision::Full,
        )
        .expect("preprocess should succeed");

        assert_eq!(batch.shape(), &[3, 3, FACE_INPUT_SIZE, FACE_INPUT_SIZE]);
    }

    #[test]
    fn preprocess_faces_normalizes_per_channel() {
        let frames = vec![uniform_frame(32, 32, [255, 0, 0])];
        let faces = vec![detection(0, 0, 0, 32, 32)];
        let normalization = Normalization {
            mean: [0.5, 0.5, 0.5],
            std: [0.5, 0.25, 0.5],
        };

        let batch = preprocess_faces(&frames, &faces, &normalization, Precision::Full)
            .expect("preprocess should succeed");

        assert!((batch[[0, 0, 100, 100]] - 1.0).abs() < 1e-5);
        assert!((batch[[0, 1, 100, 100]] + 2.0).abs() < 1e-5);
        assert!((batch[[0, 2, 0, 0]] + 1.0).abs() < 1e-5);
    }

    #[test]
    fn degenerate_crop_becomes_black_face() {
        let frames = vec![uniform_frame(16, 16, [200, 200, 200])];
        let faces = vec![detection(0, 8, 8, 8, 12), detection(5, 0, 0, 4, 4)];
        let normalization = Normalization::default();

        let batch = preprocess_faces(&frames, &faces, &normalization, Precision::Full)
            .expect("preprocess should succeed");

        for face in 0..2 {
            for c in 0..3 {
                let expected = -normalization.mean[c] / normalization.std[c];
                assert!((batch[[face, c, 5, 5]] - expected).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn half_precision_rounds_values() {
        let frames = vec![uniform_frame(8, 8, [77, 77, 77])];
        let faces = vec![detection(0, 0, 0, 8, 8)];
        let normalization = Normalization::default();

        let full = preprocess_faces(&frames, &faces, &normalization, Precision::Full).unwrap();
        let half = preprocess_faces(&frames, &faces, &normalization, Precision::Half).unwrap();

        let value = half[[0, 0, 3, 3]];
        assert_eq!(half::f16::from_f32(value).to_f32(), value);
        assert!((full[[0, 0, 3, 3]] - value).abs() < 1e-2);
    }

    #[test]
    fn f32_resize_keeps_fractional_values() {
        let rgb = [127.5f32, 0.25, 255.0].repeat(10 * 6);
        let resized = resize_rgb_f32_area(&rgb, 10, 6, 3, 7).expect("resize should succeed");
        assert_eq!(resized.len(), 3 * 7 * 3);
        for pixel in resized.chunks_exact(3) {
            assert!((pixel[0] - 127.5).abs() < 1e-3);
            assert!((pixel[1] - 0.25).abs() < 1e-3);
            assert!((pixel[2] - 255.0).abs() < 1e-3);
        }
    }

    #[test]
    fn preprocess_yolo_letterboxes_wide_frames() {
        let frame = uniform_frame(64, 32, [255, 255, 255]);
        let (input, scaled_width, scaled_height) =
            preprocess_yolo(&frame).expect("yolo preprocess should succeed");
        assert_eq!(scaled_width, 640);
        assert_eq!(scaled_height, 320);
        assert_eq!(input.len(), 3 * 640 * 640);
        assert!((input[0] - 1.0).abs() < 1e-6);
        assert!((input[639 * 640] - 114.0 / 255.0).abs() < 1e-6);
    }
}
