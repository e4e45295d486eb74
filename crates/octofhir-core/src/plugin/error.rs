use thiserror::Error;

/// Error type for plugin execution, kept deliberately small: plugins report
/// failure reasons here; the orchestrator decides separately (via timeout /
/// panic catching) whether a plugin misbehaved rather than merely failed.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin execution failed: {0}")]
    Execution(String),

    #[error("plugin '{0}' timed out")]
    Timeout(String),

    #[error("plugin '{0}' panicked: {1}")]
    Panic(String, String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PluginError {
    pub fn execution(msg: impl Into<String>) -> Self {
        PluginError::Execution(msg.into())
    }
}
