//! # Storage Module
//!
//! Uploads finalized channel logs and hands back a link the UI can offer for
//! download.
//!
//! Two backends:
//! - [`ObjectStoreUploader`] - HTTP `PUT` into an object store bucket
//! - [`LocalArchiveUploader`] - copy into a local `<dir>/<bucket>/` tree,
//!   used when no object store endpoint is configured

pub mod local;
pub mod object_store;

use std::path::Path;

use async_trait::async_trait;

use crate::error::{GatewayError, Result};

pub use local::LocalArchiveUploader;
pub use object_store::ObjectStoreUploader;

/// Default bucket for channel logs
pub const DEFAULT_BUCKET: &str = "25_logs";

/// Destination for finalized log files.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Uploads `local_path` into `bucket` and returns its download URL.
    ///
    /// An object with the same name must not be overwritten.
    async fn upload(&self, local_path: &Path, bucket: &str) -> Result<String>;
}

/// File name component of `path` as UTF-8.
pub(crate) fn object_name(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| GatewayError::Upload(format!("not an uploadable file: {}", path.display())))
}
