pub mod classifier;
pub mod error;
pub mod face;
pub mod onnx;
pub mod pipeline;
pub mod preprocess;
pub mod runtime;
pub mod saliency;
pub mod types;
