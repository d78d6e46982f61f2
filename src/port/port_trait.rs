//! Trait abstraction for the bridge's serial-port control API, to enable
//! testing and mock mode.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{AvailablePort, PortState};
use crate::bridge::BridgeClient;
use crate::error::{GatewayError, Result};
use crate::sensors::gps::TargetPayload;

/// Bridge path listing serial ports
pub const AVAILABLE_PORTS_PATH: &str = "/serial/available_ports";
/// Bridge path reporting the serial link state
pub const STATE_PATH: &str = "/serial/state";
/// Bridge path opening a serial port
pub const CONNECT_PATH: &str = "/serial/connect";
/// Bridge path closing the serial port
pub const DISCONNECT_PATH: &str = "/serial/disconnect";
/// Bridge path writing a raw frame to the serial port
pub const WRITE_PATH: &str = "/serial/write";

/// Serial-port operations offered by the bridge.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PortBridge: Send + Sync {
    /// Lists serial ports visible to the bridge
    async fn available_ports(&self) -> Result<Vec<AvailablePort>>;

    /// Current link state as reported by the bridge
    async fn state(&self) -> Result<PortState>;

    /// Opens `port_name` at `baud_rate`
    async fn connect(&self, port_name: &str, baud_rate: u32) -> Result<()>;

    /// Closes the open port
    async fn disconnect(&self) -> Result<()>;

    /// Writes an encoded frame to the open port
    async fn write(&self, payload: &TargetPayload) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct ConnectionRequest<'a> {
    #[serde(rename = "portname")]
    port_name: &'a str,
    #[serde(rename = "baudrate")]
    baud_rate: u32,
}

#[derive(Debug, Deserialize)]
struct AvailablePortsResponse {
    #[serde(default)]
    available_ports: Vec<AvailablePort>,
}

#[derive(Debug, Deserialize)]
struct StateResponse {
    state: PortState,
}

#[async_trait]
impl PortBridge for BridgeClient {
    async fn available_ports(&self) -> Result<Vec<AvailablePort>> {
        let response: AvailablePortsResponse = self.get_json(AVAILABLE_PORTS_PATH).await?;
        Ok(response.available_ports)
    }

    async fn state(&self) -> Result<PortState> {
        let response: StateResponse = self.get_json(STATE_PATH).await?;
        Ok(response.state)
    }

    async fn connect(&self, port_name: &str, baud_rate: u32) -> Result<()> {
        let request = ConnectionRequest { port_name, baud_rate };
        self.post_json(CONNECT_PATH, Some(&request)).await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.post_json::<()>(DISCONNECT_PATH, None).await?;
        Ok(())
    }

    async fn write(&self, payload: &TargetPayload) -> Result<()> {
        let response = self.post_json(WRITE_PATH, Some(payload)).await?;
        tracing::debug!("Bridge write response: {}", response.trim());
        Ok(())
    }
}

/// In-process stand-in for the bridge used in mock mode.
#[derive(Debug)]
pub struct SimulatedPortBridge {
    ports: Vec<AvailablePort>,
    state: Mutex<PortState>,
}

impl Default for SimulatedPortBridge {
    fn default() -> Self {
        Self {
            ports: vec![AvailablePort {
                description: "Simulated telemetry receiver".to_string(),
                device: "/dev/ttySIM0".to_string(),
                hwid: "SIM".to_string(),
            }],
            state: Mutex::new(PortState::Disconnected),
        }
    }
}

impl SimulatedPortBridge {
    fn set_state(&self, state: PortState) {
        *self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = state;
    }
}

#[async_trait]
impl PortBridge for SimulatedPortBridge {
    async fn available_ports(&self) -> Result<Vec<AvailablePort>> {
        Ok(self.ports.clone())
    }

    async fn state(&self) -> Result<PortState> {
        Ok(*self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner))
    }

    async fn connect(&self, port_name: &str, _baud_rate: u32) -> Result<()> {
        if !self.ports.iter().any(|p| p.device == port_name) {
            return Err(GatewayError::Transport(format!("no such port: {}", port_name)));
        }
        self.set_state(PortState::Reading);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.set_state(PortState::Disconnected);
        Ok(())
    }

    async fn write(&self, payload: &TargetPayload) -> Result<()> {
        tracing::debug!("Simulated bridge accepted {} byte frame", payload.payload.len());
        Ok(())
    }
}
