//! Request handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::AppState;
use crate::error::{GatewayError, Result};
use crate::port::{PortStatus, DEFAULT_BAUD_RATE};
use crate::sensors::gps::TargetData;
use crate::sensors::ChannelEndpoint;

pub async fn ping() -> &'static str {
    "pong"
}

pub async fn available_ports(State(state): State<AppState>) -> Result<Json<Value>> {
    let ports = state.ports().available_ports().await?;
    Ok(Json(json!({ "available_ports": ports })))
}

pub async fn port_state(State(state): State<AppState>) -> Json<PortStatus> {
    Json(state.ports().status().await)
}

/// Raw query of `POST /port/connect`; validated by hand so malformed values
/// produce the gateway's JSON error body.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    pub port: Option<String>,
    pub baudrate: Option<String>,
}

impl ConnectQuery {
    /// Port name and baud rate, defaulting the baud rate to 115200.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the port is missing or the baud rate is not a
    /// positive integer.
    pub fn parse(&self) -> Result<(String, u32)> {
        let port = match self.port.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => return Err(GatewayError::Validation("port name is required".into())),
        };

        let baud_rate = match self.baudrate.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_BAUD_RATE,
            Some(raw) => match raw.parse::<u32>() {
                Ok(b) if b > 0 => b,
                _ => {
                    return Err(GatewayError::Validation(format!("invalid baudrate: {}", raw)));
                }
            },
        };

        Ok((port, baud_rate))
    }
}

pub async fn connect_port(
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
) -> Result<Json<PortStatus>> {
    let (port, baud_rate) = query.parse()?;
    Ok(Json(state.ports().connect(&port, baud_rate).await?))
}

pub async fn disconnect_port(State(state): State<AppState>) -> Result<Json<PortStatus>> {
    Ok(Json(state.ports().disconnect().await?))
}

pub async fn latest(endpoint: Arc<dyn ChannelEndpoint>) -> Result<Json<Value>> {
    Ok(Json(endpoint.latest()?))
}

pub async fn history(endpoint: Arc<dyn ChannelEndpoint>) -> Result<Json<Value>> {
    Ok(Json(endpoint.history()?))
}

/// Response of `POST /data/<channel>/log`
#[derive(Debug, Serialize, Deserialize)]
pub struct LogLink {
    pub download_link: String,
    /// RFC 3339
    pub timestamp: String,
}

/// Persists and finalizes the channel log, then uploads the finalized file.
pub async fn flush_log(State(state): State<AppState>, endpoint: Arc<dyn ChannelEndpoint>) -> Result<Json<LogLink>> {
    let flushed = Arc::clone(&endpoint);
    let path = tokio::task::spawn_blocking(move || flushed.flush())
        .await
        .map_err(|e| GatewayError::Io(std::io::Error::other(format!("flush task failed: {}", e))))??;

    let download_link = state.uploader().upload(&path, state.bucket()).await?;
    info!("{} log available at {}", endpoint.name(), download_link);

    Ok(Json(LogLink {
        download_link,
        timestamp: chrono::Local::now().to_rfc3339(),
    }))
}

pub async fn send_target(State(state): State<AppState>, Json(target): Json<TargetData>) -> Result<Json<Value>> {
    info!(
        "Received GPS target id={} lon={} lat={}",
        target.id, target.target_lon, target.target_lat
    );
    state.ports().write_target(&target).await?;
    Ok(Json(json!({ "message": "Target data sent" })))
}
