//! Serial link state machine.
//!
//! Every transition holds the state lock across the bridge call, so
//! concurrent connect / disconnect / health-check requests are applied one at
//! a time and the recorded state always matches the last bridge answer.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{AvailablePort, PortBridge, PortState, PortStatus};
use crate::error::Result;
use crate::sensors::gps::TargetData;

/// Tracks the bridge's serial link and serializes every change to it.
pub struct PortSupervisor {
    bridge: Arc<dyn PortBridge>,
    status: Mutex<PortStatus>,
}

impl std::fmt::Debug for PortSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortSupervisor").finish_non_exhaustive()
    }
}

impl PortSupervisor {
    /// Starts in `Disconnected`.
    pub fn new(bridge: Arc<dyn PortBridge>) -> Self {
        Self {
            bridge,
            status: Mutex::new(PortStatus::default()),
        }
    }

    /// Snapshot of the recorded link status
    pub async fn status(&self) -> PortStatus {
        self.status.lock().await.clone()
    }

    /// Recorded link state
    pub async fn state(&self) -> PortState {
        self.status.lock().await.state
    }

    /// Ports the bridge can open.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the bridge cannot be reached.
    pub async fn available_ports(&self) -> Result<Vec<AvailablePort>> {
        self.bridge.available_ports().await
    }

    /// Opens `port_name` at `baud_rate`.
    ///
    /// On failure the recorded state is left as it was.
    ///
    /// # Errors
    ///
    /// Returns the bridge error.
    pub async fn connect(&self, port_name: &str, baud_rate: u32) -> Result<PortStatus> {
        let mut status = self.status.lock().await;

        self.bridge.connect(port_name, baud_rate).await?;

        *status = PortStatus {
            state: PortState::Reading,
            port_name: Some(port_name.to_string()),
            baud_rate,
        };
        info!("Connected to {} at {} baud", port_name, baud_rate);
        Ok(status.clone())
    }

    /// Closes the port.
    ///
    /// # Errors
    ///
    /// Returns the bridge error; the recorded state is left as it was.
    pub async fn disconnect(&self) -> Result<PortStatus> {
        let mut status = self.status.lock().await;
        self.disconnect_locked(&mut status).await?;
        Ok(status.clone())
    }

    /// Records `Disconnected` without asking the bridge.
    pub async fn force_disconnected(&self) {
        let mut status = self.status.lock().await;
        *status = PortStatus::default();
        info!("Port marked disconnected");
    }

    /// Queries the bridge and reconciles the recorded state.
    ///
    /// A link the bridge reports as `Error` is closed. A `Reading` answer
    /// keeps the recorded port name and baud rate; the bridge does not report
    /// them, so a link opened without [`connect`](Self::connect) has none.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the bridge cannot be queried (state unchanged),
    /// or the disconnect error if closing a failed link fails (state `Error`).
    pub async fn health_check(&self) -> Result<PortState> {
        let mut status = self.status.lock().await;

        let reported = self.bridge.state().await?;
        debug!("Bridge reports port {}", reported);

        match reported {
            PortState::Error => {
                warn!("Bridge reports a port error, disconnecting");
                if let Err(e) = self.disconnect_locked(&mut status).await {
                    status.state = PortState::Error;
                    return Err(e);
                }
            }
            PortState::Disconnected => {
                if status.state != PortState::Disconnected {
                    info!("Bridge reports port closed");
                }
                *status = PortStatus::default();
            }
            PortState::Reading => status.state = PortState::Reading,
        }

        Ok(status.state)
    }

    /// Encodes `target` and writes it to the open port.
    ///
    /// # Errors
    ///
    /// Returns the bridge error.
    pub async fn write_target(&self, target: &TargetData) -> Result<()> {
        let payload = target.to_payload();
        self.bridge.write(&payload).await?;
        debug!("Sent GPS target id={} to the port", target.id);
        Ok(())
    }

    async fn disconnect_locked(&self, status: &mut PortStatus) -> Result<()> {
        self.bridge.disconnect().await?;
        *status = PortStatus::default();
        info!("Port disconnected");
        Ok(())
    }
}
