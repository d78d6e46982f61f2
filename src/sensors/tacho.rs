//! Engine tachometer readings.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{unix_millis, unix_seconds, Reading, Simulate};

/// One tachometer sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TachoData {
    pub id: u8,
    pub timestamp: u32,
    /// Revolutions per second
    pub rps: f64,
    pub strain: u32,
    pub received_time: u64,
}

impl Reading for TachoData {
    const KIND: &'static str = "tachometer";
}

impl Simulate for TachoData {
    fn simulate<G: Rng>(rng: &mut G) -> Self {
        Self {
            id: 1,
            timestamp: unix_seconds(),
            rps: rng.gen_range(1000.0..=1500.0),
            strain: rng.gen_range(500..700),
            received_time: unix_millis(),
        }
    }
}
