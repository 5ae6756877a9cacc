//! HTTP upload client
//!
//! Sends the blob as the raw body of a `PUT` to the configured endpoint,
//! with the file name in `x-file-name` and an optional bearer token. The
//! storage gateway answers `{"url": "..."}` with the public link.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use common::Secret;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::{Result, UploadError, Uploader};

/// Header carrying the file name to the storage gateway
pub const FILE_NAME_HEADER: &str = "x-file-name";

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

/// Uploader backed by an HTTP storage gateway.
pub struct HttpUploader {
    client: reqwest::Client,
    endpoint: String,
    token: Option<Secret<String>>,
    timeout: Duration,
}

impl HttpUploader {
    pub fn new(
        client: reqwest::Client,
        endpoint: String,
        token: Option<Secret<String>>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            endpoint,
            token,
            timeout,
        }
    }

    #[instrument(skip_all, fields(file_name = %file_name, bytes = content.len()))]
    async fn put(&self, content: Bytes, file_name: &str) -> Result<String> {
        let mut request = self
            .client
            .put(&self.endpoint)
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(FILE_NAME_HEADER, file_name)
            .body(content);

        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token.expose()));
        }

        let response = request
            .send()
            .await
            .map_err(|e| UploadError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed = response
            .json::<UploadResponse>()
            .await
            .map_err(|e| UploadError::InvalidResponse(e.to_string()))?;

        if parsed.url.trim().is_empty() {
            return Err(UploadError::InvalidResponse("empty url".into()));
        }

        debug!(url = %parsed.url, "upload stored");
        Ok(parsed.url)
    }
}

impl Uploader for HttpUploader {
    fn id(&self) -> &str {
        "http"
    }

    fn upload<'a>(
        &'a self,
        content: Bytes,
        file_name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(self.put(content, file_name))
    }
}
