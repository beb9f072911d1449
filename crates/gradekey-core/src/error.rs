use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("rubric nesting exceeds {max} levels at {id:?}")]
    TooDeep { id: String, max: usize },

    #[error("invalid shape at {path}: {reason}")]
    InvalidShape { path: String, reason: String },

    #[error("not a canonical key: {0:?}")]
    InvalidKey(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

impl CoreError {
    pub(crate) fn shape(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidShape {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
