//! Error types for vocoder processing

use thiserror::Error;

/// Errors surfaced by the vocoder library.
///
/// Parameter problems are reported before any processing starts, so a
/// failed call never leaves a partially written output behind.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VocoderError {
    /// A caller-supplied setting is outside its contract
    #[error("invalid parameter `{name}`: got {value}, expected {expected}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        expected: String,
    },

    /// The FFT backend rejected a buffer
    #[error("transform error: {0}")]
    Transform(String),

    /// Decoding or encoding audio failed
    #[error("audio I/O error: {0}")]
    Audio(String),

    /// Rendering or saving a visualization failed
    #[error("image error: {0}")]
    Image(String),
}

impl VocoderError {
    /// Build an `InvalidParameter` from any displayable value
    pub fn invalid(name: &'static str, value: impl ToString, expected: impl Into<String>) -> Self {
        VocoderError::InvalidParameter {
            name,
            value: value.to_string(),
            expected: expected.into(),
        }
    }

    /// Name of the offending parameter, if this is a parameter error
    pub fn parameter(&self) -> Option<&'static str> {
        match self {
            VocoderError::InvalidParameter { name, .. } => Some(*name),
            _ => None,
        }
    }
}

impl From<std::io::Error> for VocoderError {
    fn from(err: std::io::Error) -> Self {
        VocoderError::Audio(err.to_string())
    }
}
