//! Frame sources and the frame sampling policy.

pub mod decode;

use std::path::Path;

use crate::ml::{
    error::{MlError, MlResult},
    types::Frame,
};

pub const VIDEO_EXTENSIONS: [&str; 5] = ["avi", "mp4", "mpg", "mpeg", "mov"];

/// Random access to the decoded frames of one video.
pub trait VideoSource {
    /// Total number of decodable frames.
    fn frame_count(&self) -> usize;

    /// Decode the frames at `indices` (ascending) as RGB. May return fewer
    /// frames than requested when the tail of the stream cannot be decoded.
    fn read_frames(&mut self, indices: &[usize]) -> MlResult<Vec<Frame>>;
}

/// Frame indices sampled from a `total`-frame video: a fixed stride of
/// `max(1, total / num_frames)` starting at 0, at most `num_frames` entries.
pub fn sample_indices(total: usize, num_frames: usize) -> MlResult<Vec<usize>> {
    if num_frames == 0 {
        return Err(MlError::InvalidRequest(
            "number of sampled frames must be at least 1".to_string(),
        ));
    }
    let stride = (total / num_frames).max(1);
    Ok((0..total).step_by(stride).take(num_frames).collect())
}

pub fn sample_frames(video: &mut dyn VideoSource, num_frames: usize) -> MlResult<Vec<Frame>> {
    let indices = sample_indices(video.frame_count(), num_frames)?;
    if indices.is_empty() {
        return Ok(Vec::new());
    }
    video.read_frames(&indices)
}

/// Whether `path` names an existing file with a supported video extension.
pub fn is_video(path: &Path) -> bool {
    path.is_file() && has_video_extension(path)
}

pub fn has_video_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

/// Pre-decoded frames held in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryVideo {
    frames: Vec<Frame>,
}

impl MemoryVideo {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }
}

impl VideoSource for MemoryVideo {
    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn read_frames(&mut self, indices: &[usize]) -> MlResult<Vec<Frame>> {
        Ok(indices
            .iter()
            .filter_map(|i| self.frames.get(*i).cloned())
            .collect())
    }
}
