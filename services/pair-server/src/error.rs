//! Service-specific error types

use thiserror::Error;

/// Startup errors while reaching the protocol bridge.
///
/// `BridgeUnreachable` is retried with backoff; `BridgeRejected` means the
/// bridge answered but refuses to serve (wrong version, misconfigured), so
/// retrying cannot help.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Protocol bridge unreachable: {0}")]
    BridgeUnreachable(String),

    #[error("Protocol bridge rejected the service: {0}")]
    BridgeRejected(String),

    #[error("Too many active pairing attempts (limit {0})")]
    AtCapacity(usize),
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;

/// Failure while delivering a session after the connection opened.
///
/// Caught inside the attempt and reported to the paired account; never
/// reaches the HTTP caller.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error(transparent)]
    Pairing(#[from] pairing::Error),

    #[error(transparent)]
    Upload(#[from] uploader::UploadError),
}
