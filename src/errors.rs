use std::error::Error as StdError;
use std::path::PathBuf;
use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Everything that can stop a cutout run.
///
/// Variants follow the three steps of a run (load, remove, save) so the
/// top-level handler can report which step failed without parsing messages.
#[derive(Error, Debug)]
pub enum CutoutError {
    #[error("Input image not found: {path:?}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to read {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode image {path:?}")]
    Decode {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("Background removal failed: {operation}")]
    Removal {
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("Failed to encode {path:?} as {format}")]
    Encode {
        path: PathBuf,
        format: String,
        #[source]
        source: BoxError,
    },

    #[error("Failed to write {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, CutoutError>;

impl CutoutError {
    pub(crate) fn removal(operation: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Removal {
            operation: operation.into(),
            source: source.into(),
        }
    }

    /// The message followed by every `source` in the chain, separated by `: `.
    pub fn chain(&self) -> String {
        let mut message = self.to_string();
        let mut source = self.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}

/// Convert ndarray shape errors to removal errors.
///
/// Shape errors only come out of reshaping the model's output tensor, so they
/// belong to the removal step.
impl From<ndarray::ShapeError> for CutoutError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::removal("tensor shape conversion", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_includes_sources() {
        let err = CutoutError::Write {
            path: PathBuf::from("out.png"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        };
        assert_eq!(err.chain(), "Failed to write \"out.png\": read-only");
    }

    #[test]
    fn test_chain_without_source() {
        let err = CutoutError::FileNotFound {
            path: PathBuf::from("missing.png"),
        };
        assert_eq!(err.chain(), "Input image not found: \"missing.png\"");
    }

    #[test]
    fn test_shape_error_is_removal() {
        let err: CutoutError = ndarray::Array::from_shape_vec((2, 2), vec![0.0f32; 3])
            .unwrap_err()
            .into();
        assert!(matches!(
            err,
            CutoutError::Removal { ref operation, .. } if operation == "tensor shape conversion"
        ));
    }
}
