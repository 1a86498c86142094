use thiserror::Error;

use crate::tensor::Shape;

pub type Result<T> = std::result::Result<T, NetworkError>;

/// Everything that can go wrong while building, running or training a network.
///
/// Construction errors carry the zero-based position of the offending layer so
/// the caller can point at the exact builder call.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("{call}() must be preceded by {required}()")]
    Precedence {
        call: &'static str,
        required: &'static str,
    },

    #[error("layer {layer} in block {block}: {reason}")]
    Construction {
        block: usize,
        layer: usize,
        reason: String,
    },

    #[error("layer {layer} in block {block}: {what} is set twice")]
    Repeat {
        block: usize,
        layer: usize,
        what: &'static str,
    },

    #[error("no layers can be added after a Softmax activation")]
    Finalized,

    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: Shape, actual: Shape },

    #[error("invalid range [{min}, {max}]")]
    InvalidRange { min: f64, max: f64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("dataset is empty")]
    EmptyDataset,

    #[error("{inputs} inputs but {labels} labels")]
    LabelMismatch { inputs: usize, labels: usize },

    #[error("backward called without a cached training forward pass")]
    MissingCache,

    #[error("offload error: {0}")]
    Offload(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NetworkError {
    pub(crate) fn construction(block: usize, layer: usize, reason: impl Into<String>) -> Self {
        NetworkError::Construction {
            block,
            layer,
            reason: reason.into(),
        }
    }
}
