use tracing::debug;

use crate::{
    ml::{
        error::MlResult,
        face::detect::FaceDetector,
        types::{FaceDetection, Frame},
    },
    video::{VideoSource, sample_frames},
};

/// Sampled frames and the faces found in them. `faces[i].frame_index`
/// indexes into `frames`.
#[derive(Clone, Debug, Default)]
pub struct ExtractedFaces {
    pub frames: Vec<Frame>,
    pub faces: Vec<FaceDetection>,
}

impl ExtractedFaces {
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn frame_indices(&self) -> Vec<usize> {
        self.faces.iter().map(|f| f.frame_index).collect()
    }
}

/// Samples `num_frames` frames and runs face detection on each. At most one
/// face per sampled frame is kept overall; detections past that budget are
/// ignored. Returns empty collections when no face is found.
pub fn extract_faces(
    video: &mut dyn VideoSource,
    detector: &mut dyn FaceDetector,
    num_frames: usize,
) -> MlResult<ExtractedFaces> {
    let frames = sample_frames(video, num_frames)?;
    let max_faces = frames.len();
    let mut faces = Vec::new();

    'frames: for (frame_index, frame) in frames.iter().enumerate() {
        for bounds in detector.detect(frame)? {
            if faces.len() >= max_faces {
                break 'frames;
            }
            let bounds = bounds.clamp_to(&frame.dimensions);
            faces.push(FaceDetection {
                bounds,
                frame_index,
            });
        }
    }

    debug!(frames = frames.len(), faces = faces.len(), "extracted faces");
    if faces.is_empty() {
        return Ok(ExtractedFaces::default());
    }
    Ok(ExtractedFaces { frames, faces })
}
