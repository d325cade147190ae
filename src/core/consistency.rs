//! Physical Consistency Validation
//!
//! Segment times and segment paces/power come from independent models, so
//! nothing guarantees they agree. This module cross-checks them:
//!
//! ```text
//! swim:  pace/100m × distance        vs predicted swim seconds  (5%)
//! run:   pace/km × distance          vs predicted run seconds   (5%)
//! bike:  watts implied by avg speed  vs predicted avg watts     (20%)
//! total: Σ segments + transitions    vs whole-race model total  (2%)
//! ```
//!
//! The bike power model is a two-term approximation:
//!     P = Crr·m·g·v + ½·CdA·ρ·v³
//!
//! Findings are warnings only; a prediction is never blocked or changed.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::data::tables::DistanceConfig;
use crate::models::RacePrediction;

const GRAVITY: f64 = 9.81;

/// Rolling resistance and aerodynamic constants for the bike check
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsConstants {
    pub rolling_resistance: f64,
    pub drag_area_m2: f64,
    pub air_density: f64,
}

impl Default for PhysicsConstants {
    fn default() -> Self {
        Self {
            rolling_resistance: 0.005,
            drag_area_m2: 0.35,
            air_density: 1.225,
        }
    }
}

/// Relative error tolerances per check
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerances {
    pub swim: f64,
    pub bike: f64,
    pub run: f64,
    pub total: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            swim: 0.05,
            bike: 0.20,
            run: 0.05,
            total: 0.02,
        }
    }
}

/// Which cross-check produced a warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyCheck {
    SwimPace,
    BikePower,
    RunPace,
    TotalTime,
}

/// A failed cross-check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyWarning {
    pub check: ConsistencyCheck,
    pub implied: f64,
    pub predicted: f64,
    pub relative_error: f64,
    pub tolerance: f64,
}

impl fmt::Display for ConsistencyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}: implied {:.1} vs predicted {:.1} ({:.1}% > {:.1}%)",
            self.check,
            self.implied,
            self.predicted,
            self.relative_error * 100.0,
            self.tolerance * 100.0
        )
    }
}

/// Outcome of validating one prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub warnings: Vec<ConsistencyWarning>,
}

/// Power needed to hold `speed_kmh` on flat ground, in watts.
///
/// # Examples
/// ```
/// use tripredict::core::consistency::{speed_to_watts, PhysicsConstants};
///
/// let watts = speed_to_watts(36.0, 75.0, &PhysicsConstants::default());
/// assert!((watts - 251.16).abs() < 0.01);
/// ```
pub fn speed_to_watts(speed_kmh: f64, weight_kg: f64, physics: &PhysicsConstants) -> f64 {
    let speed_ms = speed_kmh / 3.6;
    let rolling = physics.rolling_resistance * weight_kg * GRAVITY * speed_ms;
    let aero = 0.5 * physics.drag_area_m2 * physics.air_density * speed_ms.powi(3);
    rolling + aero
}

/// |implied − predicted| / reference, infinite when the reference is unusable
fn relative_error(implied: f64, predicted: f64, reference: f64) -> f64 {
    if reference > 0.0 && reference.is_finite() {
        (implied - predicted).abs() / reference
    } else {
        f64::INFINITY
    }
}

/// Cross-checks predictions against the physics model
#[derive(Debug, Clone, Default)]
pub struct ConsistencyValidator {
    tolerances: Tolerances,
    physics: PhysicsConstants,
}

impl ConsistencyValidator {
    pub fn new(tolerances: Tolerances, physics: PhysicsConstants) -> Self {
        Self {
            tolerances,
            physics,
        }
    }

    /// Validate a prediction for the given course and rider weight.
    pub fn validate(
        &self,
        prediction: &RacePrediction,
        distance: &DistanceConfig,
        weight_kg: f64,
    ) -> ValidationReport {
        let mut warnings = Vec::new();
        let mut check = |kind, implied: f64, predicted: f64, reference: f64, tolerance: f64| {
            let error = relative_error(implied, predicted, reference);
            if error > tolerance {
                warnings.push(ConsistencyWarning {
                    check: kind,
                    implied,
                    predicted,
                    relative_error: error,
                    tolerance,
                });
            }
        };

        let swim_implied = prediction.swim.pace_per_100m * distance.swim_distance_m / 100.0;
        check(
            ConsistencyCheck::SwimPace,
            swim_implied,
            prediction.swim.seconds,
            swim_implied,
            self.tolerances.swim,
        );

        let speed_kmh = if prediction.bike.seconds > 0.0 {
            distance.bike_distance_km / (prediction.bike.seconds / 3600.0)
        } else {
            f64::INFINITY
        };
        let bike_implied = speed_to_watts(speed_kmh, weight_kg, &self.physics);
        check(
            ConsistencyCheck::BikePower,
            bike_implied,
            prediction.bike.avg_watts,
            prediction.bike.avg_watts,
            self.tolerances.bike,
        );

        let run_implied = prediction.run.pace_per_km * distance.run_distance_km;
        check(
            ConsistencyCheck::RunPace,
            run_implied,
            prediction.run.seconds,
            run_implied,
            self.tolerances.run,
        );

        check(
            ConsistencyCheck::TotalTime,
            prediction.segment_sum(),
            prediction.model_total_seconds,
            prediction.model_total_seconds,
            self.tolerances.total,
        );

        ValidationReport {
            valid: warnings.is_empty(),
            warnings,
        }
    }
}
