use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExecError>;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Core(#[from] tandem_core::error::Error),

    #[error("in-memory engine: {0}")]
    Frame(#[from] tandem_frame::FrameError),

    #[error("relational engine: {0}")]
    Store(#[from] tandem_store::StoreError),

    #[error(transparent)]
    Mem(#[from] tandem_mem::error::Error),

    /// The node exists only on the relational engine; reading it back would
    /// exceed the memory budget.
    #[error("result of {node} does not fit in memory: ~{estimated} bytes needed, {available} available")]
    ResultTooLarge {
        node: String,
        estimated: usize,
        available: usize,
    },

    #[error("session state was poisoned by a panic in an earlier call")]
    Poisoned,
}
