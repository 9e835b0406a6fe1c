use serde::Serialize;
use thiserror::Error;

use crate::model::TaskId;

#[derive(Error, Debug)]
pub enum MomentumError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Remote store rejected the request ({status}): {message}")]
    RemoteRejected { status: u16, message: String },

    #[error("Identity swap rejected: {0}")]
    IdentitySwap(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl MomentumError {
    pub fn to_error_code(&self) -> &'static str {
        match self {
            MomentumError::TaskNotFound(_) => "TASK_NOT_FOUND",
            MomentumError::Transport(_) => "TRANSPORT_ERROR",
            MomentumError::InvalidInput(_) => "INVALID_INPUT",
            MomentumError::RemoteRejected { .. } => "REMOTE_REJECTED",
            MomentumError::IdentitySwap(_) => "IDENTITY_SWAP",
            _ => "INTERNAL_ERROR",
        }
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            code: self.to_error_code().to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MomentumError>;
