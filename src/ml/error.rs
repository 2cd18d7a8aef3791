use thiserror::Error;

pub type MlResult<T> = Result<T, MlError>;

#[derive(Debug, Error)]
pub enum MlError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("video error: {0}")]
    Video(String),
    #[error("{0} not found in PATH")]
    ToolNotFound(&'static str),
    #[error("preprocess error: {0}")]
    Preprocess(String),
    #[error("onnx runtime error: {0}")]
    Ort(String),
    #[error("classifier returned logits of shape {actual:?}, expected [{expected_rows}, 2]")]
    ClassifierShape {
        expected_rows: usize,
        actual: Vec<usize>,
    },
    #[error("attribution error: {0}")]
    Attribution(String),
    #[error("postprocess error: {0}")]
    Postprocess(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ort::Error> for MlError {
    fn from(value: ort::Error) -> Self {
        MlError::Ort(value.to_string())
    }
}

impl From<image::ImageError> for MlError {
    fn from(value: image::ImageError) -> Self {
        MlError::Decode(value.to_string())
    }
}
