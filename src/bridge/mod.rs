//! # Bridge Client Module
//!
//! HTTP client for the local instrument bridge.
//!
//! The bridge owns the physical instruments and the serial port. It exposes:
//! - `GET  /data/<channel>` - one raw reading per request
//! - `GET  /serial/available_ports`
//! - `GET  /serial/state`
//! - `POST /serial/connect`, `POST /serial/disconnect`, `POST /serial/write`
//!
//! Every request carries a client-side timeout so a stalled bridge cannot
//! hold a poller forever.

pub mod fetcher;

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{GatewayError, Result};

/// Default bridge address
pub const DEFAULT_BRIDGE_URL: &str = "http://localhost:7878";

/// Prefix of per-channel data endpoints
pub const DATA_PATH_PREFIX: &str = "/data/";

/// Thin JSON-over-HTTP client for the bridge.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    base_url: String,
    http: reqwest::Client,
}

impl BridgeClient {
    /// Creates a client for `base_url` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Bridge base URL (no trailing slash)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for a bridge path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `GET path` and decode the JSON body.
    ///
    /// # Errors
    ///
    /// Returns `Transport` on connection failure, timeout, non-2xx status or
    /// an undecodable body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!("GET {}", path);
        let response = self.http.get(self.url(path)).send().await?;
        let response = check_status(path, response).await?;

        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::Transport(format!("failed to decode {} response: {}", path, e)))
    }

    /// `POST path` with an optional JSON body; returns the response text.
    ///
    /// # Errors
    ///
    /// Returns `Transport` on connection failure, timeout or non-2xx status.
    pub async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: Option<&B>) -> Result<String> {
        debug!("POST {}", path);
        let mut request = self.http.post(self.url(path));
        request = match body {
            Some(body) => request.json(body),
            None => request.header(reqwest::header::CONTENT_TYPE, "application/json"),
        };

        let response = check_status(path, request.send().await?).await?;
        Ok(response.text().await?)
    }
}

async fn check_status(path: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(GatewayError::Transport(format!(
        "bridge {} returned {}: {}",
        path,
        status,
        body.trim()
    )))
}
