use super::config::ConfigError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a job outright.
///
/// These are operator-level conditions: the worker is gone, the job tree cannot be
/// written, the request itself is malformed. A stage that runs and fails is not an
/// error at this level; it is reported through the job result instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Worker '{worker}' not found or not running: {reason}")]
    WorkerUnavailable { worker: String, reason: String },

    #[error("Failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error on '{path}': {source}", path = path.display())]
    JobIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PipelineError {
    pub(crate) fn job_io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::JobIo { path, source }
    }
}
