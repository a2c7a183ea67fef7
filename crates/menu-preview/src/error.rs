use thiserror::Error;

/// Failures local to one preview. They never escape the preview that hit
/// them; the surface shows a textual fallback instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PreviewError {
    #[error("Model load failed: {0}")]
    ModelLoadFailed(String),

    #[error("Model is {size} bytes, limit is {limit}")]
    ModelTooLarge { size: u64, limit: u64 },

    #[error("Invalid model: {0}")]
    InvalidModel(String),
}

impl PreviewError {
    /// Short text for the fallback panel.
    pub fn fallback_text(&self) -> &'static str {
        match self {
            Self::ModelLoadFailed(_) => "3D model could not be loaded",
            Self::ModelTooLarge { .. } => "3D model is too large to preview",
            Self::InvalidModel(_) => "3D model format is not supported",
        }
    }
}

impl From<reqwest::Error> for PreviewError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::ModelLoadFailed("request timed out".into())
        } else {
            Self::ModelLoadFailed(err.to_string())
        }
    }
}

impl From<std::io::Error> for PreviewError {
    fn from(err: std::io::Error) -> Self {
        Self::ModelLoadFailed(err.to_string())
    }
}

pub type PreviewResult<T> = Result<T, PreviewError>;
