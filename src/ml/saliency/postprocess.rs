//! Turns a raw attribution map into a `[0, 1]` heatmap.
//!
//! The shaping is asymmetric: faces in a video judged FAKE get
//! their strongest evidence isolated and amplified, faces in a video judged
//! REAL are shown as the raw attribution. The heatmaps therefore answer
//! "what looks fake here", not "what did the model look at".

use ndarray::Array2;

use crate::{
    image::filter::gaussian_blur,
    ml::{error::MlResult, types::Label},
};

pub const THRESHOLD_STD_FACTOR: f32 = 0.5;
pub const FAKE_EVIDENCE_GAIN: f32 = 3.0;
pub const BLUR_KERNEL_SIZE: usize = 15;
pub const BLUR_SIGMA: f32 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaliencyPolicy {
    /// Threshold at `mean + 0.5 * std`, amplify survivors, blur.
    EmphasizeFakeEvidence,
    /// Leave the attribution untouched.
    Raw,
}

impl SaliencyPolicy {
    pub fn for_label(label: Label) -> Self {
        match label {
            Label::Fake => SaliencyPolicy::EmphasizeFakeEvidence,
            Label::Real => SaliencyPolicy::Raw,
        }
    }

    pub fn apply(self, map: Array2<f32>) -> MlResult<Array2<f32>> {
        match self {
            SaliencyPolicy::EmphasizeFakeEvidence => {
                let amplified = threshold_and_amplify(map);
                gaussian_blur(&amplified, BLUR_KERNEL_SIZE, BLUR_SIGMA)
            }
            SaliencyPolicy::Raw => Ok(map),
        }
    }
}

pub fn postprocess_saliency(map: Array2<f32>, label: Label) -> MlResult<Array2<f32>> {
    let shaped = SaliencyPolicy::for_label(label).apply(map)?;
    Ok(normalize_min_max(shaped))
}

/// `mean + 0.5 * std` over the map, with the population standard deviation.
pub fn fake_evidence_threshold(map: &Array2<f32>) -> f32 {
    if map.is_empty() {
        return 0.0;
    }
    let n = map.len() as f64;
    let mean = map.iter().map(|v| *v as f64).sum::<f64>() / n;
    let variance = map
        .iter()
        .map(|v| {
            let d = *v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    (mean + THRESHOLD_STD_FACTOR as f64 * variance.sqrt()) as f32
}

/// Zeroes values below [`fake_evidence_threshold`] and multiplies the rest
/// by [`FAKE_EVIDENCE_GAIN`].
pub fn threshold_and_amplify(mut map: Array2<f32>) -> Array2<f32> {
    let threshold = fake_evidence_threshold(&map);
    map.mapv_inplace(|v| {
        if v < threshold {
            0.0
        } else {
            v * FAKE_EVIDENCE_GAIN
        }
    });
    map
}

/// Min-max scaling to `[0, 1]`. Constant maps are returned unchanged.
pub fn normalize_min_max(mut map: Array2<f32>) -> Array2<f32> {
    let (min, max) = map
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });
    if max <= min {
        return map;
    }
    let range = max - min;
    map.mapv_inplace(|v| (v - min) / range);
    map
}
