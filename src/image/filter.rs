use image::{ImageBuffer, Luma};
use imageproc::filter::separable_filter_equal;
use ndarray::Array2;

use crate::ml::error::{MlError, MlResult};

/// Normalized 1-D Gaussian kernel of odd length `size`, centred on the
/// middle tap.
pub fn gaussian_kernel(size: usize, sigma: f32) -> Vec<f32> {
    let center = (size as f32 - 1.0) / 2.0;
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / denom).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    for tap in &mut kernel {
        *tap /= sum;
    }
    kernel
}

/// Separable Gaussian blur of a single-channel map with a `size x size`
/// kernel.
pub fn gaussian_blur(map: &Array2<f32>, size: usize, sigma: f32) -> MlResult<Array2<f32>> {
    if size % 2 == 0 || sigma <= 0.0 {
        return Err(MlError::Postprocess(format!(
            "invalid gaussian kernel size={size} sigma={sigma}"
        )));
    }
    let (height, width) = map.dim();
    if height == 0 || width == 0 {
        return Ok(map.clone());
    }

    let image: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_raw(width as u32, height as u32, map.iter().copied().collect())
            .ok_or_else(|| MlError::Postprocess("failed to wrap saliency map".to_string()))?;
    let kernel = gaussian_kernel(size, sigma);
    let blurred = separable_filter_equal(&image, &kernel);

    Array2::from_shape_vec((height, width), blurred.into_raw())
        .map_err(|e| MlError::Postprocess(format!("blurred map has wrong size: {e}")))
}
