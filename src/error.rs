use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdvectrixError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Partition error: {0}")]
    Partition(String),

    #[error("Communication error: {0}")]
    Communication(String),

    #[error("Numerical instability: {0}")]
    NumericalInstability(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdvectrixError {
    /// True for errors raised because a peer went away rather than a local fault.
    pub fn is_communication(&self) -> bool {
        matches!(self, AdvectrixError::Communication(_))
    }
}

pub type Result<T> = std::result::Result<T, AdvectrixError>;
