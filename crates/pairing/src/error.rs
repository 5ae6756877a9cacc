//! Error types for session provisioning operations

/// Errors from the provisioning workflow and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid phone number: {0}")]
    InvalidNumber(String),

    #[error("pairing code request failed: {0}")]
    PairingCode(String),

    #[error("protocol client error: {0}")]
    Client(String),

    #[error("message send failed: {0}")]
    Send(String),

    #[error("credential export failed: {0}")]
    Export(String),

    #[error("unexpected upload URL: {0}")]
    UploadUrl(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for provisioning operations.
pub type Result<T> = std::result::Result<T, Error>;
