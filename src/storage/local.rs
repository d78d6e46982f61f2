//! Local archive backend.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use super::{object_name, Uploader};
use crate::error::{GatewayError, Result};

/// Copies logs into `<root>/<bucket>/` and returns a `file://` URL.
#[derive(Debug, Clone)]
pub struct LocalArchiveUploader {
    root: PathBuf,
}

impl LocalArchiveUploader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Uploader for LocalArchiveUploader {
    async fn upload(&self, local_path: &Path, bucket: &str) -> Result<String> {
        let name = object_name(local_path)?;
        let bucket_dir = self.root.join(bucket);
        tokio::fs::create_dir_all(&bucket_dir)
            .await
            .map_err(|e| GatewayError::Upload(format!("cannot create {}: {}", bucket_dir.display(), e)))?;

        let dest = bucket_dir.join(name);
        if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            return Err(GatewayError::Upload(format!("{}/{} already exists", bucket, name)));
        }

        tokio::fs::copy(local_path, &dest)
            .await
            .map_err(|e| GatewayError::Upload(format!("failed to copy {}: {}", local_path.display(), e)))?;

        let dest = tokio::fs::canonicalize(&dest).await.unwrap_or(dest);
        info!("Archived {} to {}", name, dest.display());
        Ok(format!("file://{}", dest.display()))
    }
}
