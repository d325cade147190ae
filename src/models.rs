use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::consistency::ValidationReport;
use crate::core::tier::Tier;

/// Race distance category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DistanceCategory {
    #[serde(rename = "sprint")]
    Sprint,
    #[serde(rename = "olympic")]
    Olympic,
    #[serde(rename = "70.3")]
    Half,
    #[serde(rename = "140.6")]
    Full,
}

impl DistanceCategory {
    pub const ALL: [DistanceCategory; 4] = [
        DistanceCategory::Sprint,
        DistanceCategory::Olympic,
        DistanceCategory::Half,
        DistanceCategory::Full,
    ];

    /// Key used in artifact names and lookup tables
    pub fn key(&self) -> &'static str {
        match self {
            DistanceCategory::Sprint => "sprint",
            DistanceCategory::Olympic => "olympic",
            DistanceCategory::Half => "70.3",
            DistanceCategory::Full => "140.6",
        }
    }
}

impl fmt::Display for DistanceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for DistanceCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sprint" => Ok(DistanceCategory::Sprint),
            "olympic" => Ok(DistanceCategory::Olympic),
            "70.3" | "half" => Ok(DistanceCategory::Half),
            "140.6" | "full" | "ironman" => Ok(DistanceCategory::Full),
            other => Err(format!("unknown distance category: {}", other)),
        }
    }
}

/// Athlete gender as encoded in the cohort tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "M", alias = "male")]
    Male,
    #[serde(rename = "F", alias = "female")]
    Female,
}

impl Gender {
    pub fn key(&self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
        }
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "m" | "male" => Ok(Gender::Male),
            "f" | "female" => Ok(Gender::Female),
            other => Err(format!("unknown gender: {}", other)),
        }
    }
}

/// A previous race finish
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorResult {
    pub distance: DistanceCategory,
    pub finish_seconds: f64,
}

/// Sparse athlete profile supplied with a prediction request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInput {
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub age: Option<u32>,
    /// Functional threshold power in watts
    #[serde(default)]
    pub ftp_watts: Option<f64>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    /// Critical swim speed expressed as pace (seconds per 100 m)
    #[serde(default)]
    pub css_sec_per_100m: Option<f64>,
    /// Run threshold pace (seconds per km)
    #[serde(default)]
    pub threshold_pace_sec_per_km: Option<f64>,
    #[serde(default)]
    pub prior_results: Vec<PriorResult>,
}

impl UserInput {
    /// Whether any fitness benchmark (FTP, CSS, threshold pace) is present
    pub fn has_fitness_metric(&self) -> bool {
        self.ftp_watts.is_some()
            || self.css_sec_per_100m.is_some()
            || self.threshold_pace_sec_per_km.is_some()
    }
}

/// Confidence label shown alongside a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Moderate,
    High,
}

impl Confidence {
    pub fn from_tier(tier: Tier) -> Self {
        match tier.level() {
            3..=5 => Confidence::High,
            2 => Confidence::Moderate,
            _ => Confidence::Low,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Confidence::Low => "low",
            Confidence::Moderate => "moderate",
            Confidence::High => "high",
        };
        f.write_str(label)
    }
}

/// Confidence interval of the finish time, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantileSeconds {
    pub p05: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
}

impl QuantileSeconds {
    pub fn from_array(values: [f64; 5]) -> Self {
        Self {
            p05: values[0],
            p25: values[1],
            p50: values[2],
            p75: values[3],
            p95: values[4],
        }
    }

    pub fn as_array(&self) -> [f64; 5] {
        [self.p05, self.p25, self.p50, self.p75, self.p95]
    }

    pub fn is_monotonic(&self) -> bool {
        self.as_array().windows(2).all(|w| w[0] <= w[1])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwimPrediction {
    pub seconds: f64,
    pub pace_per_100m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BikePrediction {
    pub seconds: f64,
    pub avg_watts: f64,
    pub normalized_watts: f64,
    pub intensity_factor: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunPrediction {
    pub seconds: f64,
    pub pace_per_km: f64,
    pub pace_per_mile: f64,
}

/// Transition times (T1: swim to bike, T2: bike to run)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transitions {
    pub t1: f64,
    pub t2: f64,
}

/// Full race-time prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RacePrediction {
    pub distance: DistanceCategory,
    /// Segments plus transitions
    pub total_seconds: f64,
    /// Whole-race model output; informs validation only
    pub model_total_seconds: f64,
    pub quantiles: QuantileSeconds,
    pub swim: SwimPrediction,
    pub bike: BikePrediction,
    pub run: RunPrediction,
    pub transitions: Transitions,
    pub confidence: Confidence,
    pub tier: Tier,
    pub model_version: String,
    pub generated_at: DateTime<Utc>,
}

impl RacePrediction {
    /// Sum of segment and transition times
    pub fn segment_sum(&self) -> f64 {
        self.swim.seconds
            + self.bike.seconds
            + self.run.seconds
            + self.transitions.t1
            + self.transitions.t2
    }
}

/// Race prediction request
#[derive(Debug, Serialize, Deserialize)]
pub struct PredictRequest {
    pub distance: DistanceCategory,
    #[serde(default)]
    pub input: UserInput,
}

/// Race prediction response
#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: RacePrediction,
    pub validation: ValidationReport,
}

/// Tier classification response
#[derive(Debug, Serialize, Deserialize)]
pub struct TierResponse {
    pub tier: Tier,
    pub confidence: Confidence,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub cached_models: usize,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_keys_round_trip_through_serde() {
        for distance in DistanceCategory::ALL {
            let json = serde_json::to_string(&distance).unwrap();
            assert_eq!(json, format!("\"{}\"", distance.key()));
            let back: DistanceCategory = serde_json::from_str(&json).unwrap();
            assert_eq!(back, distance);
        }
    }

    #[test]
    fn test_distance_from_str_aliases() {
        assert_eq!("70.3".parse::<DistanceCategory>(), Ok(DistanceCategory::Half));
        assert_eq!("Ironman".parse::<DistanceCategory>(), Ok(DistanceCategory::Full));
        assert!("marathon".parse::<DistanceCategory>().is_err());
    }

    #[test]
    fn test_user_input_deserializes_from_empty_object() {
        let input: UserInput = serde_json::from_str("{}").unwrap();
        assert_eq!(input, UserInput::default());
    }

    #[test]
    fn test_user_input_gender_aliases() {
        let input: UserInput = serde_json::from_str(r#"{"gender": "female", "age": 41}"#).unwrap();
        assert_eq!(input.gender, Some(Gender::Female));
        assert_eq!(input.age, Some(41));
    }

    #[test]
    fn test_confidence_from_tier() {
        assert_eq!(Confidence::from_tier(Tier::NONE), Confidence::Low);
        assert_eq!(Confidence::from_tier(Tier::DEMOGRAPHICS), Confidence::Low);
        assert_eq!(Confidence::from_tier(Tier::SINGLE_RACE), Confidence::Moderate);
        assert_eq!(Confidence::from_tier(Tier::FITNESS_METRICS), Confidence::High);
        assert_eq!(Confidence::from_tier(Tier::RACE_HISTORY), Confidence::High);
    }

    #[test]
    fn test_quantile_monotonic_check() {
        let ok = QuantileSeconds::from_array([1.0, 2.0, 2.0, 3.0, 4.0]);
        assert!(ok.is_monotonic());
        let crossed = QuantileSeconds::from_array([1.0, 3.0, 2.0, 4.0, 5.0]);
        assert!(!crossed.is_monotonic());
    }
}
