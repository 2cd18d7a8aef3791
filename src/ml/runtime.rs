use std::{path::PathBuf, str::FromStr};

use crate::ml::error::{MlError, MlResult};

pub const DEFAULT_NUM_FRAMES: usize = 15;
pub const DEFAULT_ALPHA: f64 = 0.8;
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Device {
    #[default]
    Cpu,
    /// CPU with the XNNPACK execution provider.
    Xnnpack,
    Cuda,
}

impl FromStr for Device {
    type Err = MlError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            "xnnpack" => Ok(Device::Xnnpack),
            "cuda" | "gpu" => Ok(Device::Cuda),
            other => Err(MlError::InvalidRequest(format!("unknown device '{other}'"))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Precision {
    #[default]
    Full,
    Half,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionProviderPolicy {
    pub prefer_cuda: bool,
    pub prefer_xnnpack: bool,
    pub allow_cpu_fallback: bool,
}

impl ExecutionProviderPolicy {
    pub fn for_device(device: Device) -> Self {
        Self {
            prefer_cuda: device == Device::Cuda,
            prefer_xnnpack: device == Device::Xnnpack,
            ..Self::default()
        }
    }
}

impl Default for ExecutionProviderPolicy {
    fn default() -> Self {
        Self {
            prefer_cuda: false,
            prefer_xnnpack: false,
            allow_cpu_fallback: true,
        }
    }
}

/// Per-channel mean/std applied to face tensors after scaling to `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelPaths {
    pub face_detection: String,
    pub classifier_weights: String,
}

/// Everything a pipeline instance needs; owned by the pipeline for its
/// whole lifetime.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    pub num_frames: usize,
    pub device: Device,
    pub precision: Precision,
    pub normalization: Normalization,
    pub alpha: f64,
    pub jpeg_quality: u8,
    pub heatmap_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            num_frames: DEFAULT_NUM_FRAMES,
            device: Device::Cpu,
            precision: Precision::Full,
            normalization: Normalization::default(),
            alpha: DEFAULT_ALPHA,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            heatmap_dir: PathBuf::from("heatmaps"),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> MlResult<Self> {
        let defaults = Self::default();
        let device = match std::env::var("DFX_DEVICE") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.device,
        };
        let precision = if env_flag("DFX_FP16") {
            Precision::Half
        } else {
            Precision::Full
        };

        let config = Self {
            num_frames: env_parse("DFX_NUM_FRAMES").unwrap_or(defaults.num_frames),
            device,
            precision,
            normalization: defaults.normalization,
            alpha: env_parse("DFX_ALPHA").unwrap_or(defaults.alpha),
            jpeg_quality: env_parse("DFX_JPEG_QUALITY").unwrap_or(defaults.jpeg_quality),
            heatmap_dir: std::env::var("DFX_HEATMAP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.heatmap_dir),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MlResult<()> {
        if self.num_frames == 0 {
            return Err(MlError::InvalidRequest(
                "number of sampled frames must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(MlError::InvalidRequest(format!(
                "alpha must be within [0, 1], got {}",
                self.alpha
            )));
        }
        if self.normalization.std.iter().any(|s| *s <= 0.0) {
            return Err(MlError::InvalidRequest(
                "normalization std must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn provider_policy(&self) -> ExecutionProviderPolicy {
        ExecutionProviderPolicy::for_device(self.device)
    }
}

impl ModelPaths {
    pub fn from_env() -> MlResult<Self> {
        let face_detection = std::env::var("DFX_DETECTOR_MODEL").unwrap_or_default();
        let classifier_weights = std::env::var("DFX_CLASSIFIER_WEIGHTS").unwrap_or_default();

        let mut missing = Vec::new();
        if face_detection.trim().is_empty() {
            missing.push("DFX_DETECTOR_MODEL");
        }
        if classifier_weights.trim().is_empty() {
            missing.push("DFX_CLASSIFIER_WEIGHTS");
        }
        if !missing.is_empty() {
            return Err(MlError::InvalidRequest(format!(
                "missing required model paths: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            face_detection,
            classifier_weights,
        })
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
