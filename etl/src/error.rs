use thiserror::Error;

/// Coarse failure kinds surfaced by the pipeline stages.
///
/// Each stage logs the underlying cause where it is detected and returns one
/// of these; the job runner only ever sees this type.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Load failed: {0}")]
    Load(String),

    #[error("Transform failed: {0}")]
    Transform(String),
}

impl PipelineError {
    /// Stage label used in the final log line.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Config(_) => "config",
            PipelineError::Auth(_) => "auth",
            PipelineError::Fetch(_) => "fetch",
            PipelineError::Load(_) => "load",
            PipelineError::Transform(_) => "transform",
        }
    }
}

impl From<config::ConfigError> for PipelineError {
    fn from(error: config::ConfigError) -> Self {
        PipelineError::Config(error.to_string())
    }
}
