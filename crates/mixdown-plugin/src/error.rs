//! Plugin subsystem errors.

use mixdown_core::MixdownError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin not found: {0}")]
    NotFound(Uuid),
    #[error("plugin '{0}' has no editor")]
    NoEditor(String),
    #[error("editor error: {0}")]
    Editor(String),
    #[error("parameter out of range: {0}")]
    Range(String),
}

impl From<PluginError> for MixdownError {
    fn from(err: PluginError) -> Self {
        match err {
            PluginError::Range(msg) => MixdownError::Range(msg),
            PluginError::NotFound(id) => MixdownError::InvalidArgument(format!("plugin not found: {}", id)),
            other => MixdownError::NotSupported(other.to_string()),
        }
    }
}
