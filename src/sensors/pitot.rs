//! Pitot tube (airspeed, angle of attack, sideslip) readings.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{unix_seconds, Reading, Simulate};

/// One pitot sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitotData {
    pub id: u8,
    pub timestamp: u32,
    pub temperature: f32,
    /// Airspeed in m/s
    pub velocity: f32,
    /// Raw dynamic pressure
    pub pressure_v_raw: f32,
    /// Raw angle-of-attack pressure
    pub pressure_a_raw: f32,
    /// Raw sideslip pressure
    pub pressure_s_raw: f32,
}

impl Reading for PitotData {
    const KIND: &'static str = "pitot";
}

impl Simulate for PitotData {
    fn simulate<G: Rng>(rng: &mut G) -> Self {
        Self {
            id: 1,
            timestamp: unix_seconds(),
            temperature: rng.gen_range(15.0..=25.0),
            velocity: rng.gen_range(5.0..=10.0),
            pressure_v_raw: rng.gen_range(1000.0..=1200.0),
            pressure_a_raw: rng.gen_range(800.0..=1100.0),
            pressure_s_raw: rng.gen_range(900.0..=1150.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_bridge_payload() {
        let json = r#"{"id":1,"timestamp":5,"temperature":20.5,"velocity":7.25,
            "pressure_v_raw":1100.0,"pressure_a_raw":900.0,"pressure_s_raw":1000.0}"#;
        let data: PitotData = serde_json::from_str(json).unwrap();
        assert_eq!(data.velocity, 7.25);
        assert_eq!(data.pressure_a_raw, 900.0);
    }
}
