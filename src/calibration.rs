//! # Calibration Module
//!
//! Inverts actuator response curves so logged actuator telemetry can be shown
//! on the same scale as the commanded value.
//!
//! ## Response Curves
//!
//! An actuator's forward response maps a commanded input `u` to the physical
//! angle it produces. The servo curves are quartic fits:
//!
//! `angle(u) = c0 + c1·u + c2·u² + c3·u³ + c4·u⁴ + offset`
//!
//! ## Inverse Table
//!
//! The forward curve is sampled once at startup over a fixed domain. Because
//! the curve is monotonic, the sampled outputs are sorted and the inverse is a
//! binary search: find the first sample whose output reaches the target and
//! return its input.
//!
//! ## Usage
//!
//! ```
//! use telemetry_gateway::calibration::{InverseModel, Monotonicity};
//!
//! let model = InverseModel::build(|u| 2.0 * u, -1.0, 1.0, 0.01, Monotonicity::Increasing)?;
//!
//! // 2u = 1.0  =>  u = 0.5
//! assert!((model.invert(1.0) - 0.5).abs() <= 0.01 + 1e-9);
//!
//! // Out-of-range targets clamp to the table edges
//! assert_eq!(model.invert(100.0), model.samples().last().unwrap().0);
//! # Ok::<(), telemetry_gateway::error::GatewayError>(())
//! ```

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{GatewayError, Result};

/// Upper bound on table size, guarding against a tiny step over a wide domain.
pub const MAX_TABLE_SAMPLES: usize = 1_000_000;

/// Slack for floating point error when counting samples in the domain.
const SAMPLE_COUNT_EPSILON: f64 = 1e-9;

/// Expected ordering of a response curve's outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Monotonicity {
    /// Outputs never decrease as the input grows
    Increasing,
    /// Outputs never increase as the input grows
    Decreasing,
}

/// A pair of adjacent samples that break the expected ordering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonotonicViolation {
    /// Index of the later sample
    pub index: usize,
    /// Output at `index - 1`
    pub previous: f64,
    /// Output at `index`
    pub current: f64,
}

/// Polynomial response curve evaluated with Horner's method.
///
/// # Examples
///
/// ```
/// use telemetry_gateway::calibration::Polynomial;
///
/// // 1 + 2x + 3x²
/// let p = Polynomial::new(&[1.0, 2.0, 3.0]);
/// assert_eq!(p.eval(2.0), 17.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Polynomial<'a> {
    /// Coefficients, lowest order first
    coeffs: &'a [f64],
}

impl<'a> Polynomial<'a> {
    #[must_use]
    pub const fn new(coeffs: &'a [f64]) -> Self {
        Self { coeffs }
    }

    /// Coefficients, lowest order first.
    #[must_use]
    pub fn coeffs(&self) -> &'a [f64] {
        self.coeffs
    }

    #[inline]
    #[must_use]
    pub fn eval(&self, x: f64) -> f64 {
        self.coeffs.iter().rev().fold(0.0, |acc, &c| acc * x + c)
    }
}

/// Sampled forward curve with binary-search inversion.
#[derive(Debug, Clone)]
pub struct InverseModel {
    direction: Monotonicity,
    step: f64,
    /// `(input, output)` pairs in input order
    samples: Vec<(f64, f64)>,
    violations: Vec<MonotonicViolation>,
}

impl InverseModel {
    /// Samples `response` over `[low, high]` every `step` and builds the table.
    ///
    /// Samples are generated by index (`low + i·step`) so the grid does not
    /// drift. Every adjacent pair that breaks `direction` is logged and kept
    /// in [`violations`](Self::violations); the table is still built.
    ///
    /// # Arguments
    ///
    /// * `response` - Forward response curve
    /// * `low`, `high` - Input domain, `low < high`
    /// * `step` - Sampling step, `> 0`
    /// * `direction` - Expected ordering of the outputs
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the domain or step is not finite, the domain is
    /// empty, the table would exceed [`MAX_TABLE_SAMPLES`], or the response
    /// produces a non-finite output.
    pub fn build<F>(response: F, low: f64, high: f64, step: f64, direction: Monotonicity) -> Result<Self>
    where
        F: Fn(f64) -> f64,
    {
        if !(low.is_finite() && high.is_finite() && step.is_finite()) {
            return Err(GatewayError::Validation(format!(
                "inverse table bounds must be finite (low={}, high={}, step={})",
                low, high, step
            )));
        }
        if step <= 0.0 {
            return Err(GatewayError::Validation(format!("sampling step must be positive, got {}", step)));
        }
        if high <= low {
            return Err(GatewayError::Validation(format!(
                "empty domain: low ({}) must be below high ({})",
                low, high
            )));
        }

        let intervals = ((high - low) / step + SAMPLE_COUNT_EPSILON).floor();
        if intervals >= MAX_TABLE_SAMPLES as f64 {
            return Err(GatewayError::Validation(format!(
                "inverse table would need {} samples (max {})",
                intervals + 1.0,
                MAX_TABLE_SAMPLES
            )));
        }
        let count = intervals as usize + 1;

        let mut samples = Vec::with_capacity(count);
        for i in 0..count {
            let input = low + i as f64 * step;
            let output = response(input);
            if !output.is_finite() {
                return Err(GatewayError::Validation(format!(
                    "response is not finite at input {}: {}",
                    input, output
                )));
            }
            samples.push((input, output));
        }

        let violations = find_violations(&samples, direction);
        for v in &violations {
            warn!(
                "Response not {:?} at index {}: {} then {}",
                direction, v.index, v.previous, v.current
            );
        }
        debug!(
            "Built inverse table: {} samples over [{}, {}], {} violations",
            samples.len(),
            low,
            high,
            violations.len()
        );

        Ok(Self {
            direction,
            step,
            samples,
            violations,
        })
    }

    /// Index of the first sample whose output reaches `target`, clamped to
    /// the table.
    ///
    /// Increasing tables look for the first output `>= target`, decreasing
    /// tables for the first output `<= target`.
    #[must_use]
    pub fn invert_index(&self, target: f64) -> usize {
        let idx = match self.direction {
            Monotonicity::Increasing => self.samples.partition_point(|&(_, out)| out < target),
            Monotonicity::Decreasing => self.samples.partition_point(|&(_, out)| out > target),
        };
        idx.min(self.samples.len() - 1)
    }

    /// Sampled input whose output is closest from above (or below, for
    /// decreasing tables) to `target`.
    #[must_use]
    pub fn invert(&self, target: f64) -> f64 {
        self.samples[self.invert_index(target)].0
    }

    #[must_use]
    pub fn direction(&self) -> Monotonicity {
        self.direction
    }

    #[must_use]
    pub fn step(&self) -> f64 {
        self.step
    }

    #[must_use]
    pub fn samples(&self) -> &[(f64, f64)] {
        &self.samples
    }

    /// Ordering violations found at build time.
    #[must_use]
    pub fn violations(&self) -> &[MonotonicViolation] {
        &self.violations
    }

    /// Outputs at the first and last samples.
    #[must_use]
    pub fn output_bounds(&self) -> (f64, f64) {
        (self.samples[0].1, self.samples[self.samples.len() - 1].1)
    }
}

fn find_violations(samples: &[(f64, f64)], direction: Monotonicity) -> Vec<MonotonicViolation> {
    samples
        .windows(2)
        .enumerate()
        .filter_map(|(i, pair)| {
            let (previous, current) = (pair[0].1, pair[1].1);
            let broken = match direction {
                Monotonicity::Increasing => current < previous,
                Monotonicity::Decreasing => current > previous,
            };
            broken.then_some(MonotonicViolation {
                index: i + 1,
                previous,
                current,
            })
        })
        .collect()
}
