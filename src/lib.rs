//! Deepfake video classification with guided-backprop saliency heatmaps.
//!
//! A video is sampled into frames, faces are detected and classified as one
//! batch, and every face is then explained against the fake class and
//! written as an overlay JPEG.

pub mod api;
pub mod image;
pub mod ml;
pub mod video;
