use thiserror::Error;

use crate::pty::PtyError;

#[derive(Error, Debug)]
pub enum PtywardError {
    #[error(transparent)]
    Pty(#[from] PtyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PtywardError>;
