use thiserror::Error;

pub type AgentResult<T> = Result<T, AgentError>;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("internal error: {0}")]
    InternalError(String),
    #[error("error in I/O: {0}")]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    CommonError(#[from] moor_common::error::CommonError),
}
