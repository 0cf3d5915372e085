//! Error types for Mixdown.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Main error type for Mixdown operations.
#[derive(Error, Debug)]
pub enum MixdownError {
    /// A numeric input fell outside its documented domain.
    #[error("Out of range: {0}")]
    Range(String),

    /// The operation is not valid for the object's current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The operation is undefined for this clip or track variant.
    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A required collaborator (input device, MIDI port) is not configured.
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// File I/O failed while producing an artifact; temporaries were cleaned up.
    #[error("Resource error ({path}): {context}: {source}")]
    Resource {
        path: PathBuf,
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("MIDI error: {0}")]
    Midi(String),

    #[error("Device error: {0}")]
    Device(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl MixdownError {
    /// Wrap an I/O failure on `path` with a short description of the step that failed.
    pub fn resource(path: impl Into<PathBuf>, context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Resource {
            path: path.into(),
            context: context.into(),
            source,
        }
    }
}

/// Result type alias for Mixdown operations.
pub type Result<T> = std::result::Result<T, MixdownError>;

// ── Operation result ────────────────────────────────────────────

/// Outcome of an add/remove/swap operation that is expected to fail
/// sometimes (duplicate clip, wrong plugin kind, bad index).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    success: bool,
    message: String,
}

impl OperationResult {
    pub fn success() -> Self {
        Self {
            success: true,
            message: String::new(),
        }
    }

    pub fn success_with(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn is_failure(&self) -> bool {
        !self.success
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.success, self.message.is_empty()) {
            (true, true) => write!(f, "ok"),
            (true, false) => write!(f, "ok: {}", self.message),
            (false, _) => write!(f, "failed: {}", self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_result_success() {
        let r = OperationResult::success();
        assert!(r.is_success());
        assert!(!r.is_failure());
        assert_eq!(r.message(), "");
        assert_eq!(r.to_string(), "ok");
    }

    #[test]
    fn test_operation_result_failure() {
        let r = OperationResult::failure("duplicate clip");
        assert!(r.is_failure());
        assert_eq!(r.message(), "duplicate clip");
        assert_eq!(r.to_string(), "failed: duplicate clip");
    }

    #[test]
    fn test_resource_error_display() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked");
        let err = MixdownError::resource("/tmp/a_rev.wav", "reverse", io);
        let text = err.to_string();
        assert!(text.contains("a_rev.wav"));
        assert!(text.contains("reverse"));
        assert!(text.contains("locked"));
    }
}
