//! Attachment errors

use thiserror::Error;

use crate::links::LinkError;
use crate::storage::StorageError;
use crate::token::InvalidToken;

/// Errors raised by attachment operations
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error(transparent)]
    InvalidToken(#[from] InvalidToken),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Link error: {0}")]
    Link(#[from] LinkError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid file: {0}")]
    InvalidFile(String),
    #[error("Attachment not found: {0}")]
    NotFound(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type AttachmentResult<T> = Result<T, AttachmentError>;

/// HTTP status code mapping for errors
impl AttachmentError {
    pub fn status_code(&self) -> u16 {
        match self {
            AttachmentError::InvalidToken(_) => 400,
            AttachmentError::NotFound(_) | AttachmentError::Storage(StorageError::NotFound(_)) => {
                404
            }
            AttachmentError::InvalidFile(_) => 422,
            AttachmentError::Storage(_)
            | AttachmentError::Link(_)
            | AttachmentError::Io(_)
            | AttachmentError::Config(_) => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AttachmentError::InvalidToken(_) => "invalid_token",
            AttachmentError::Storage(StorageError::NotFound(_)) | AttachmentError::NotFound(_) => {
                "not_found"
            }
            AttachmentError::Storage(_) => "storage_error",
            AttachmentError::Link(_) => "link_error",
            AttachmentError::Io(_) => "io_error",
            AttachmentError::InvalidFile(_) => "invalid_file",
            AttachmentError::Config(_) => "configuration_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AttachmentError::from(InvalidToken::Empty).status_code(), 400);
        assert_eq!(
            AttachmentError::from(StorageError::NotFound("k".into())).status_code(),
            404
        );
        assert_eq!(
            AttachmentError::from(StorageError::BackendError("down".into())).status_code(),
            500
        );
        assert_eq!(AttachmentError::InvalidFile("x".into()).error_code(), "invalid_file");
    }
}
