use std::path::PathBuf;

use thiserror::Error;

use crate::container::ContainerError;
use crate::input::InputError;

/// Run-level failures. Every variant aborts the run; nothing is written in its place.
#[derive(Debug, Error)]
pub enum PackError {
    /// Inconsistent manifest, detected before any per-gene work starts.
    #[error("precondition failed: {0}")]
    Precondition(String),
    /// Malformed samples, registration or annotation for one gene or array.
    #[error("data error: {0}")]
    Data(String),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl PackError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PackError::Io {
            path: path.into(),
            source,
        }
    }
}
