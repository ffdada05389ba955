use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum BallastError {
    #[error("job {id} requests cpu={cpu} ram_mb={ram_mb}, exceeding total pool capacity")]
    UnsatisfiableResourceRequest { id: Uuid, cpu: u32, ram_mb: u64 },

    #[error("resource accounting violation: {0}")]
    AccountingViolation(String),

    #[error("backend communication error: {0}")]
    BackendCommunication(String),

    #[error("invalid job spec: {0}")]
    InvalidJobSpec(String),

    #[error("job not found: {0}")]
    JobNotFound(Uuid),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BallastError>;
