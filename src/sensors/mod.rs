//! # Sensors Module
//!
//! Record types for every measurement channel and the glue that lets the
//! HTTP layer treat all channels alike.
//!
//! This module handles:
//! - Record shapes as sent by the bridge (`altimeter`, `gps`, `pitot`,
//!   `tachometer`, `servo`)
//! - Simulated readings for mock mode
//! - Per-kind "latest" views (GPS subset, servo with inverted actuator angles)
//! - [`ChannelEndpoint`], a type-erased handle over a generic [`Channel`]

pub mod altimeter;
pub mod gps;
pub mod pitot;
pub mod servo;
pub mod tacho;

use std::path::PathBuf;
use std::sync::Arc;

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::telemetry::channel::Channel;

/// A record type carried by one channel.
pub trait Reading: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Channel name: route segment, bridge endpoint and log file prefix
    const KIND: &'static str;
}

/// Generates a plausible random reading.
pub trait Simulate: Sized {
    fn simulate<G: Rng>(rng: &mut G) -> Self;
}

/// Renders the "latest" response for a reading.
pub trait View<R>: Send + Sync {
    fn render(&self, reading: &R) -> Result<Value>;
}

/// Returns the record unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawView;

impl<R: Serialize> View<R> for RawView {
    fn render(&self, reading: &R) -> Result<Value> {
        Ok(serde_json::to_value(reading)?)
    }
}

/// Channel operations exposed to request handlers, independent of the
/// record type.
pub trait ChannelEndpoint: Send + Sync {
    fn name(&self) -> &str;

    /// Rendered most recent reading; `NotFound` when empty.
    fn latest(&self) -> Result<Value>;

    /// Buffered readings as a JSON array.
    fn history(&self) -> Result<Value>;

    /// Persists and finalizes the channel log; returns the finalized path.
    fn flush(&self) -> Result<PathBuf>;
}

/// [`ChannelEndpoint`] over a typed channel and its view.
pub struct SensorChannel<R, V> {
    channel: Arc<Channel<R>>,
    view: V,
}

impl<R: Reading, V: View<R>> SensorChannel<R, V> {
    pub fn new(channel: Arc<Channel<R>>, view: V) -> Self {
        Self { channel, view }
    }

    pub fn channel(&self) -> &Arc<Channel<R>> {
        &self.channel
    }
}

impl<R: Reading, V: View<R>> ChannelEndpoint for SensorChannel<R, V> {
    fn name(&self) -> &str {
        self.channel.name()
    }

    fn latest(&self) -> Result<Value> {
        let reading = self.channel.latest()?;
        self.view.render(&reading)
    }

    fn history(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.channel.history())?)
    }

    fn flush(&self) -> Result<PathBuf> {
        self.channel.flush()
    }
}

/// Current time as Unix seconds, the way the bridge stamps readings.
pub(crate) fn unix_seconds() -> u32 {
    chrono::Utc::now().timestamp() as u32
}

/// Current time as Unix milliseconds.
pub(crate) fn unix_millis() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}
