//! # Port Module
//!
//! Supervises the bridge's serial link to the telemetry receiver.
//!
//! This module handles:
//! - Connect / disconnect requests forwarded to the bridge
//! - Tracking the link state seen by the UI
//! - Periodic health checks that drop a link the bridge reports as failed
//! - Writing encoded GPS target frames to the link

pub mod port_trait;
pub mod supervisor;

use serde::{Deserialize, Serialize};

pub use port_trait::{PortBridge, SimulatedPortBridge};
pub use supervisor::PortSupervisor;

/// Baud rate used when a connect request does not name one
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Serial link state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortState {
    #[default]
    Disconnected,
    #[serde(alias = "CONNECTING", alias = "CONNECTED")]
    Reading,
    Error,
}

impl std::fmt::Display for PortState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PortState::Disconnected => "DISCONNECTED",
            PortState::Reading => "READING",
            PortState::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Link state plus the parameters of the open port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PortStatus {
    pub state: PortState,
    /// `None` while disconnected, or while reading a link the gateway did not
    /// open itself
    pub port_name: Option<String>,
    /// 0 whenever `port_name` is `None`
    #[serde(rename = "baudrate")]
    pub baud_rate: u32,
}

/// Serial port as listed by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailablePort {
    #[serde(default)]
    pub description: String,
    pub device: String,
    #[serde(default)]
    pub hwid: String,
}
