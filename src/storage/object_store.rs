//! Object store backend.
//!
//! Objects are written with `PUT <endpoint>/<bucket>/<name>` and an
//! `If-None-Match: *` precondition, so an existing object is never replaced.
//! The returned link is `<public_base_url>/<bucket>/<name>`.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, IF_NONE_MATCH};
use reqwest::StatusCode;
use tracing::{debug, info};

use super::{object_name, Uploader};
use crate::error::{GatewayError, Result};

/// Default upload timeout
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(50);

#[derive(Debug, Clone)]
pub struct ObjectStoreUploader {
    endpoint: String,
    public_base_url: String,
    http: reqwest::Client,
}

impl ObjectStoreUploader {
    /// Creates an uploader for `endpoint`.
    ///
    /// Download links use `public_base_url`, or the endpoint itself when
    /// none is given.
    ///
    /// # Errors
    ///
    /// Returns `Upload` if the HTTP client cannot be built.
    pub fn new(endpoint: &str, public_base_url: Option<&str>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Upload(format!("failed to build HTTP client: {}", e)))?;

        let endpoint = endpoint.trim_end_matches('/').to_string();
        let public_base_url = public_base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| endpoint.clone());

        Ok(Self {
            endpoint,
            public_base_url,
            http,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Download link for `name` in `bucket`.
    pub fn download_url(&self, bucket: &str, name: &str) -> String {
        format!("{}/{}/{}", self.public_base_url, bucket, name)
    }
}

#[async_trait]
impl Uploader for ObjectStoreUploader {
    async fn upload(&self, local_path: &Path, bucket: &str) -> Result<String> {
        let name = object_name(local_path)?;
        let body = tokio::fs::read(local_path)
            .await
            .map_err(|e| GatewayError::Upload(format!("failed to read {}: {}", local_path.display(), e)))?;

        let url = format!("{}/{}/{}", self.endpoint, bucket, name);
        debug!("PUT {} ({} bytes)", url, body.len());

        let response = self
            .http
            .put(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(IF_NONE_MATCH, "*")
            .body(body)
            .send()
            .await
            .map_err(|e| GatewayError::Upload(format!("failed to upload {}: {}", name, e)))?;

        match response.status() {
            status if status.is_success() => {
                info!("Uploaded {} to bucket {}", name, bucket);
                Ok(self.download_url(bucket, name))
            }
            StatusCode::PRECONDITION_FAILED => Err(GatewayError::Upload(format!(
                "{}/{} already exists",
                bucket, name
            ))),
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(GatewayError::Upload(format!(
                    "object store returned {} for {}: {}",
                    status,
                    name,
                    text.trim()
                )))
            }
        }
    }
}
