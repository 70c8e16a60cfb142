use thiserror::Error;

use crate::config::Backend;

/// Canonical result for core.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A node could not be built from the given arguments. Always raised at
    /// construction time, never deferred to compute time.
    #[error("Invalid construction: {0}")]
    Construction(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Schema error: {0}")]
    Schema(String),

    /// Some ancestor cannot be computed on the chosen backend.
    #[error("Backend {backend} is unreachable: {failures} ancestor(s) cannot be computed there")]
    BackendUnreachable { backend: Backend, failures: usize },

    #[error("Internal invariant failed: {0}")]
    Invariant(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}
