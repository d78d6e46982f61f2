//! Barometric altimeter readings.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{Reading, Simulate};

/// One altimeter sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AltimeterData {
    /// Altitude in meters
    pub altitude: f64,
    /// Pressure in hPa
    pub pressure: f64,
    /// Temperature in Celsius
    pub temperature: f64,
    /// Relative humidity in percent
    pub humidity: f64,
    /// Unix seconds
    pub timestamp: i64,
    pub device_id: String,
}

impl Reading for AltimeterData {
    const KIND: &'static str = "altimeter";
}

impl Simulate for AltimeterData {
    fn simulate<G: Rng>(rng: &mut G) -> Self {
        let altitude = rng.gen_range(0.0..=15.0);
        Self {
            altitude,
            // ~0.12 hPa per meter near sea level
            pressure: 1013.25 - altitude * 0.12 + rng.gen_range(-0.05..=0.05),
            temperature: rng.gen_range(18.0..=28.0),
            humidity: rng.gen_range(40.0..=70.0),
            timestamp: chrono::Utc::now().timestamp(),
            device_id: "altimeter-sim".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_field_names() {
        let data = AltimeterData {
            device_id: "device123".into(),
            ..Default::default()
        };
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["device_id"], "device123");
        assert!(value.get("altitude").is_some());
        assert!(value.get("humidity").is_some());
    }

    #[test]
    fn test_simulated_pressure_tracks_altitude() {
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let d = AltimeterData::simulate(&mut rng);
            assert!(d.pressure < 1013.4 && d.pressure > 1011.0);
        }
    }
}
