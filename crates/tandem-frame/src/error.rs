use thiserror::Error;

pub type Result<T> = std::result::Result<T, FrameError>;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("schema error: {0}")]
    Schema(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("integer overflow in {0}")]
    Overflow(String),

    #[error("length mismatch: expected {expected} values, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error(transparent)]
    Core(#[from] tandem_core::error::Error),
}
