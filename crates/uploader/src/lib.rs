//! Blob storage upload abstraction
//!
//! Defines the `Uploader` trait that decouples the provisioning workflow
//! from the storage service holding exported credentials. The workflow hands
//! over opaque bytes plus a file name and gets back a dereferenceable URL;
//! how the storage service authenticates or stores the blob is the
//! uploader's concern.

pub mod http;

pub use http::HttpUploader;

use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;

/// Errors from upload operations.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("upload request failed: {0}")]
    Http(String),

    #[error("upload rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid upload response: {0}")]
    InvalidResponse(String),
}

impl UploadError {
    /// Label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            UploadError::Http(_) => "http",
            UploadError::Rejected { .. } => "rejected",
            UploadError::InvalidResponse(_) => "invalid_response",
        }
    }
}

/// Result alias for upload operations.
pub type Result<T> = std::result::Result<T, UploadError>;

/// Stores a blob and returns the URL it can be fetched from.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Uploader>`).
pub trait Uploader: Send + Sync {
    /// Identifier for logging (e.g. "http")
    fn id(&self) -> &str;

    /// Upload `content` under `file_name`. Content is arbitrary binary data.
    fn upload<'a>(
        &'a self,
        content: Bytes,
        file_name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_display_includes_status_and_body() {
        let err = UploadError::Rejected {
            status: 413,
            body: "too large".into(),
        };
        assert_eq!(err.to_string(), "upload rejected (413): too large");
        assert_eq!(err.label(), "rejected");
    }

    #[test]
    fn labels_are_distinct() {
        let labels = [
            UploadError::Http("x".into()).label(),
            UploadError::Rejected {
                status: 500,
                body: String::new(),
            }
            .label(),
            UploadError::InvalidResponse("x".into()).label(),
        ];
        assert_eq!(labels, ["http", "rejected", "invalid_response"]);
    }
}
