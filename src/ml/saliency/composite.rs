use std::{
    fs,
    path::{Path, PathBuf},
};

use ndarray::Array2;
use tracing::{debug, warn};

use crate::{
    image::{colormap::jet, image_compression::encode_frame_jpeg},
    ml::{
        error::MlResult,
        preprocess::resize_rgb_f32_area,
        types::{ColorOrder, FaceDetection, Frame},
    },
};

/// `gbmap_{basename}_vid{video_counter}_face{face_index}.jpg`
pub fn heatmap_file_name(video_name: &str, video_counter: usize, face_index: usize) -> String {
    let basename = Path::new(video_name)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| video_name.to_string());
    format!("gbmap_{basename}_vid{video_counter}_face{face_index}.jpg")
}

/// Maps a `[0, 1]` heatmap to jet colors. Values are scaled by 255 and
/// truncated.
pub fn colorize(heatmap: &Array2<f32>) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(heatmap.len() * 3);
    for value in heatmap.iter() {
        let level = (value * 255.0).clamp(0.0, 255.0) as u8;
        rgb.extend_from_slice(&jet(level));
    }
    rgb
}

/// `alpha * original + (1 - alpha) * heat` in single precision, clipped to
/// `[0, 255]` and truncated. Both weights are rounded to `f32` from their
/// double-precision values. The original frame dominates for the default
/// alpha of 0.8.
pub fn blend_pixel(original: u8, heat: f32, alpha: f64) -> u8 {
    let (weight, heat_weight) = (alpha as f32, (1.0 - alpha) as f32);
    let value = original as f32 * weight + heat * heat_weight;
    value.clamp(0.0, 255.0) as u8
}

pub struct Compositor {
    alpha: f64,
    jpeg_quality: u8,
    output_dir: PathBuf,
}

impl Compositor {
    pub fn new(alpha: f64, jpeg_quality: u8, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            alpha,
            jpeg_quality,
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Returns a copy of the face's source frame with the colorized heatmap
    /// blended over the face box. The source frames are never modified.
    /// `None` when the box is empty or the frame index is out of range.
    pub fn composite_face(
        &self,
        frames: &[Frame],
        face: &FaceDetection,
        heatmap: &Array2<f32>,
    ) -> MlResult<Option<Frame>> {
        let Some(source) = frames.get(face.frame_index) else {
            return Ok(None);
        };
        let bounds = face.bounds.clamp_to(&source.dimensions);
        if bounds.is_empty() {
            return Ok(None);
        }

        let (map_height, map_width) = heatmap.dim();
        let colored: Vec<f32> = colorize(heatmap).into_iter().map(f32::from).collect();
        let mut heat = resize_rgb_f32_area(
            &colored,
            map_width as u32,
            map_height as u32,
            bounds.width(),
            bounds.height(),
        )?;
        if source.order == ColorOrder::Bgr {
            for pixel in heat.chunks_exact_mut(3) {
                pixel.swap(0, 2);
            }
        }

        let mut annotated = source.clone();
        let frame_width = annotated.width() as usize;
        let box_width = bounds.width() as usize;
        for row in 0..bounds.height() as usize {
            let y = bounds.top as usize + row;
            let start = (y * frame_width + bounds.left as usize) * 3;
            let target = &mut annotated.pixels[start..start + box_width * 3];
            let heat_row = &heat[row * box_width * 3..(row + 1) * box_width * 3];
            for (pixel, heat) in target.iter_mut().zip(heat_row) {
                *pixel = blend_pixel(*pixel, *heat, self.alpha);
            }
        }
        Ok(Some(annotated))
    }

    /// Composites one face and writes it as a JPEG. Skipped faces return
    /// `Ok(None)` and write nothing.
    pub fn write_heatmap(
        &self,
        frames: &[Frame],
        face: &FaceDetection,
        heatmap: &Array2<f32>,
        video_name: &str,
        video_counter: usize,
        face_index: usize,
    ) -> MlResult<Option<PathBuf>> {
        let Some(annotated) = self.composite_face(frames, face, heatmap)? else {
            warn!(
                video = video_name,
                face_index,
                frame_index = face.frame_index,
                "skipping face with empty box or unknown frame"
            );
            return Ok(None);
        };

        fs::create_dir_all(&self.output_dir)?;
        let path = self
            .output_dir
            .join(heatmap_file_name(video_name, video_counter, face_index));
        let encoded = encode_frame_jpeg(&annotated, self.jpeg_quality)?;
        fs::write(&path, encoded)?;
        debug!(path = %path.display(), "wrote heatmap");
        Ok(Some(path))
    }
}
