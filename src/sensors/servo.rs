//! # Servo
//!
//! Rudder/elevator actuator telemetry.
//!
//! The bridge reports both the commanded surface values (`rudder`,
//! `elevator`) and the angle the servo horn actually reached
//! (`*_servo_angle`). For display, the reached angle is mapped back to the
//! command scale through the inverse of each servo's response curve.
//!
//! ## Response Curves
//!
//! Quartic fits over commands in `[-20, 20]`, both offset by 180°:
//!
//! | Axis | c0 | c1 | c2 | c3 | c4 | Ordering |
//! |------|----|----|----|----|----|----------|
//! | Rudder | 4.39 | 4.21 | -0.0205 | 5.84e-3 | 1.12e-4 | increasing |
//! | Elevator | -51.2 | -6.52 | -0.27 | -0.0301 | -8.65e-4 | decreasing |

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{unix_millis, unix_seconds, Reading, Simulate, View};
use crate::calibration::{InverseModel, Monotonicity, Polynomial};
use crate::error::Result;

/// Command domain covered by the inverse tables
pub const COMMAND_MIN: f64 = -20.0;
pub const COMMAND_MAX: f64 = 20.0;

/// Sampling step of the inverse tables
pub const COMMAND_STEP: f64 = 0.01;

/// Neutral horn angle added to both fits
const SERVO_ANGLE_OFFSET: f64 = 180.0;

const RUDDER_FIT: Polynomial<'static> = Polynomial::new(&[4.39, 4.21, -0.0205, 5.84e-3, 1.12e-4]);
const ELEVATOR_FIT: Polynomial<'static> = Polynomial::new(&[-51.2, -6.52, -0.27, -0.0301, -8.65e-4]);

/// Rudder servo angle produced by `command`.
#[must_use]
pub fn rudder_response(command: f64) -> f64 {
    RUDDER_FIT.eval(command) + SERVO_ANGLE_OFFSET
}

/// Elevator servo angle produced by `command`.
#[must_use]
pub fn elevator_response(command: f64) -> f64 {
    ELEVATOR_FIT.eval(command) + SERVO_ANGLE_OFFSET
}

/// One servo telemetry frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoData {
    pub id: u8,
    pub status: u8,
    pub timestamp: u32,
    /// Commanded rudder
    pub rudder: f64,
    /// Commanded elevator
    pub elevator: f64,
    pub voltage: f64,
    pub rudder_current: f64,
    pub elevator_current: f64,
    pub trim: f64,
    /// Angle reached by the rudder servo
    pub rudder_servo_angle: f64,
    /// Angle reached by the elevator servo
    pub elevator_servo_angle: f64,
    pub rudder_temperature: f64,
    pub elevator_temperature: f64,
    pub received_time: u64,
}

impl Reading for ServoData {
    const KIND: &'static str = "servo";
}

impl Simulate for ServoData {
    fn simulate<G: Rng>(rng: &mut G) -> Self {
        let rudder = rng.gen_range(-15.0..=15.0);
        let elevator = rng.gen_range(-15.0..=5.0);
        Self {
            id: 1,
            status: 1,
            timestamp: unix_seconds(),
            rudder,
            elevator,
            voltage: rng.gen_range(11.0..=13.0),
            rudder_current: rng.gen_range(1.0..=4.0),
            elevator_current: rng.gen_range(1.0..=4.0),
            trim: rng.gen_range(-2.5..=0.5),
            // The horn lags the command slightly
            rudder_servo_angle: rudder_response(rudder + rng.gen_range(-0.3..=0.3)),
            elevator_servo_angle: elevator_response(elevator + rng.gen_range(-0.3..=0.3)),
            rudder_temperature: rng.gen_range(25.0..=45.0),
            elevator_temperature: rng.gen_range(25.0..=45.0),
            received_time: unix_millis(),
        }
    }
}

/// Servo frame as shown to the pilot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServoSummary {
    pub rudder: f64,
    pub elevator: f64,
    pub trim: f64,
    pub rudder_actual_angle: f64,
    pub elevator_actual_angle: f64,
    pub rudder_temperature: f64,
    pub elevator_temperature: f64,
    pub received_time: u64,
    pub timestamp: u32,
}

/// "Latest" view that inverts the reached servo angles.
#[derive(Debug, Clone)]
pub struct ServoView {
    rudder: InverseModel,
    elevator: InverseModel,
}

impl ServoView {
    /// Builds both inverse tables.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if a table cannot be built.
    pub fn new() -> Result<Self> {
        let rudder = InverseModel::build(
            rudder_response,
            COMMAND_MIN,
            COMMAND_MAX,
            COMMAND_STEP,
            Monotonicity::Increasing,
        )?;
        let elevator = InverseModel::build(
            elevator_response,
            COMMAND_MIN,
            COMMAND_MAX,
            COMMAND_STEP,
            Monotonicity::Decreasing,
        )?;

        info!(
            "Servo inverse tables ready ({} rudder / {} elevator samples)",
            rudder.samples().len(),
            elevator.samples().len()
        );
        Ok(Self { rudder, elevator })
    }

    pub fn rudder(&self) -> &InverseModel {
        &self.rudder
    }

    pub fn elevator(&self) -> &InverseModel {
        &self.elevator
    }

    #[must_use]
    pub fn summarize(&self, data: &ServoData) -> ServoSummary {
        ServoSummary {
            rudder: data.rudder,
            elevator: data.elevator,
            trim: data.trim,
            rudder_actual_angle: self.rudder.invert(data.rudder_servo_angle),
            elevator_actual_angle: self.elevator.invert(data.elevator_servo_angle),
            rudder_temperature: data.rudder_temperature,
            elevator_temperature: data.elevator_temperature,
            received_time: data.received_time,
            timestamp: data.timestamp,
        }
    }
}

impl View<ServoData> for ServoView {
    fn render(&self, reading: &ServoData) -> Result<Value> {
        Ok(serde_json::to_value(self.summarize(reading))?)
    }
}
