//! The per-video heatmap pipeline: extract faces, classify the video, then
//! explain every face against the fake class and write the overlays.

use std::path::{Path, PathBuf};

use ndarray::Axis;
use tracing::{debug, info};

use crate::{
    ml::{
        classifier::{GuidedBackward, predict},
        error::MlResult,
        face::{detect::FaceDetector, extract::extract_faces},
        preprocess::preprocess_faces,
        runtime::PipelineConfig,
        saliency::{
            attribute::GuidedBackprop,
            composite::Compositor,
            postprocess::postprocess_saliency,
        },
        types::Prediction,
    },
    video::{VideoSource, decode::FfmpegVideo},
};

#[derive(Clone, Debug, PartialEq)]
pub struct VideoReport {
    pub prediction: Prediction,
    /// Faces that went through the classifier.
    pub faces: usize,
    /// Heatmaps written, in face order. Skipped faces leave no entry.
    pub heatmaps: Vec<PathBuf>,
}

pub struct HeatmapPipeline {
    config: PipelineConfig,
    detector: Box<dyn FaceDetector>,
    classifier: Box<dyn GuidedBackward>,
    compositor: Compositor,
}

impl HeatmapPipeline {
    pub fn new(
        config: PipelineConfig,
        detector: Box<dyn FaceDetector>,
        classifier: Box<dyn GuidedBackward>,
    ) -> MlResult<Self> {
        config.validate()?;
        let compositor = Compositor::new(
            config.alpha,
            config.jpeg_quality,
            config.heatmap_dir.clone(),
        );
        Ok(Self {
            config,
            detector,
            classifier,
            compositor,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Decodes `path` with ffmpeg and runs [`Self::process_video`] on it.
    pub fn process_file(&mut self, path: &Path, video_counter: usize) -> MlResult<VideoReport> {
        let mut video = FfmpegVideo::open(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.process_video(&mut video, &name, video_counter)
    }

    pub fn process_video(
        &mut self,
        video: &mut dyn VideoSource,
        video_name: &str,
        video_counter: usize,
    ) -> MlResult<VideoReport> {
        let extracted = extract_faces(video, self.detector.as_mut(), self.config.num_frames)?;
        if extracted.is_empty() {
            info!(video = video_name, "no faces detected");
            return Ok(VideoReport {
                prediction: Prediction::no_faces(),
                faces: 0,
                heatmaps: Vec::new(),
            });
        }

        let batch = preprocess_faces(
            &extracted.frames,
            &extracted.faces,
            &self.config.normalization,
            self.config.precision,
        )?;
        let prediction = predict(self.classifier.as_ref(), batch.view())?;
        info!(
            video = video_name,
            faces = extracted.faces.len(),
            label = %prediction.label,
            probability = prediction.probability,
            "classified video"
        );

        let attributor = GuidedBackprop::new(self.classifier.as_ref());
        let mut heatmaps = Vec::new();
        for (face_index, face) in extracted.faces.iter().enumerate() {
            let saliency = attributor.saliency(batch.index_axis(Axis(0), face_index))?;
            let heatmap = postprocess_saliency(saliency, prediction.label)?;
            let written = self.compositor.write_heatmap(
                &extracted.frames,
                face,
                &heatmap,
                video_name,
                video_counter,
                face_index,
            )?;
            if let Some(path) = written {
                heatmaps.push(path);
            }
        }
        debug!(video = video_name, heatmaps = heatmaps.len(), "video done");

        Ok(VideoReport {
            prediction,
            faces: extracted.faces.len(),
            heatmaps,
        })
    }
}
