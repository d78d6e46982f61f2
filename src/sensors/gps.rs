//! # GPS
//!
//! GPS fix readings and the navigation target uplink.
//!
//! ## Target Payload Layout (48 bytes)
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 1 | id |
//! | 1 | 3 | zero padding |
//! | 4 | 4 | timestamp (big-endian) |
//! | 8 | 4 | target longitude (big-endian) |
//! | 12 | 4 | target latitude (big-endian) |
//! | 16 | 32 | free-form data, zero padded |

use chrono::Datelike;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::{unix_millis, Reading, Simulate, View};
use crate::error::Result;

/// Size of the serial target frame
pub const TARGET_PAYLOAD_SIZE: usize = 48;

/// Offset of the free-form data section
const TARGET_DATA_OFFSET: usize = 16;

/// Maximum free-form data bytes
pub const TARGET_DATA_CAPACITY: usize = TARGET_PAYLOAD_SIZE - TARGET_DATA_OFFSET;

/// One GPS fix as reported by the receiver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsData {
    pub id: u8,
    #[serde(rename = "fixmode")]
    pub fix_mode: u8,
    #[serde(rename = "PDOP")]
    pub pdop: u16,
    pub year: u16,
    #[serde(rename = "iTow")]
    pub itow: u32,
    pub unixtime: u32,
    /// Longitude, 1e-7 degrees
    pub lon: u32,
    /// Latitude, 1e-7 degrees
    pub lat: u32,
    /// Height, mm
    pub height: u32,
    #[serde(rename = "hAcc")]
    pub h_acc: u32,
    #[serde(rename = "vAcc")]
    pub v_acc: u32,
    /// Ground speed, mm/s
    #[serde(rename = "gSpeed")]
    pub g_speed: u32,
    /// Heading of motion, 1e-5 degrees
    #[serde(rename = "headMot")]
    pub head_mot: u32,
    pub received_time: u64,
}

impl Reading for GpsData {
    const KIND: &'static str = "gps";
}

impl Simulate for GpsData {
    fn simulate<G: Rng>(rng: &mut G) -> Self {
        let now = chrono::Utc::now();
        let unix = now.timestamp() as u32;
        // Around Chikubu Island, Lake Biwa
        Self {
            id: 1,
            fix_mode: 3,
            pdop: rng.gen_range(100..300),
            year: now.year() as u16,
            itow: unix,
            unixtime: unix,
            lon: 1_360_952_000 + rng.gen_range(0..1_000_000),
            lat: 352_786_000 + rng.gen_range(0..1_000_000),
            height: rng.gen_range(50_000..150_000),
            h_acc: rng.gen_range(1_000..6_000),
            v_acc: rng.gen_range(2_000..10_000),
            g_speed: rng.gen_range(0..50_000),
            head_mot: rng.gen_range(0..360_000_000),
            received_time: unix_millis(),
        }
    }
}

/// Subset of a fix shown on the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpsSummary {
    pub unixtime: u32,
    pub lon: u32,
    pub lat: u32,
    pub received_time: u64,
}

impl From<&GpsData> for GpsSummary {
    fn from(data: &GpsData) -> Self {
        Self {
            unixtime: data.unixtime,
            lon: data.lon,
            lat: data.lat,
            received_time: data.received_time,
        }
    }
}

/// "Latest" view returning a [`GpsSummary`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GpsView;

impl View<GpsData> for GpsView {
    fn render(&self, reading: &GpsData) -> Result<Value> {
        Ok(serde_json::to_value(GpsSummary::from(reading))?)
    }
}

/// Navigation target sent from the UI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetData {
    pub id: u8,
    pub timestamp: u32,
    pub target_lon: u32,
    pub target_lat: u32,
    pub data: Vec<u8>,
}

/// Body of the bridge's serial write request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetPayload {
    pub payload: Vec<u8>,
}

impl TargetData {
    /// Packs the target into the fixed 48-byte serial frame.
    ///
    /// Data beyond [`TARGET_DATA_CAPACITY`] bytes is dropped.
    #[must_use]
    pub fn encode(&self) -> [u8; TARGET_PAYLOAD_SIZE] {
        let mut frame = [0u8; TARGET_PAYLOAD_SIZE];

        frame[0] = self.id;
        frame[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        frame[8..12].copy_from_slice(&self.target_lon.to_be_bytes());
        frame[12..16].copy_from_slice(&self.target_lat.to_be_bytes());

        if self.data.len() > TARGET_DATA_CAPACITY {
            warn!(
                "Target data is {} bytes, truncating to {}",
                self.data.len(),
                TARGET_DATA_CAPACITY
            );
        }
        let n = self.data.len().min(TARGET_DATA_CAPACITY);
        frame[TARGET_DATA_OFFSET..TARGET_DATA_OFFSET + n].copy_from_slice(&self.data[..n]);

        frame
    }

    /// Encoded frame wrapped for the bridge.
    #[must_use]
    pub fn to_payload(&self) -> TargetPayload {
        TargetPayload {
            payload: self.encode().to_vec(),
        }
    }
}
