//! Lookup tables shipped next to the tree ensembles
//!
//! Three JSON artifacts:
//! - `imputation_tables.json`: cohort medians, transfer ratios, strength
//!   defaults and transition estimates
//! - `feature_config.json`: ordered feature names, encodings, defaults
//! - `model_metadata.json`: model version and per-distance course lengths

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{PredictionError, Result};
use crate::models::{DistanceCategory, Gender};

pub const IMPUTATION_TABLES_ARTIFACT: &str = "imputation_tables.json";
pub const FEATURE_CONFIG_ARTIFACT: &str = "feature_config.json";
pub const MODEL_METADATA_ARTIFACT: &str = "model_metadata.json";

/// Median finish time of a cohort, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CohortMedian {
    pub total_sec: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrengthDefaults {
    pub swim_strength_z: f64,
    pub bike_strength_z: f64,
    pub run_strength_z: f64,
}

impl Default for StrengthDefaults {
    fn default() -> Self {
        Self {
            swim_strength_z: 0.0,
            bike_strength_z: 0.0,
            run_strength_z: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransitionEstimate {
    pub t1: f64,
    pub t2: f64,
}

/// Population mean and spread of one fitness benchmark
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub mean: f64,
    pub std: f64,
}

/// Reference distributions used to turn fitness benchmarks into z-scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrengthReference {
    pub bike_watts_per_kg: Reference,
    pub run_threshold_pace_sec_per_km: Reference,
    pub swim_css_sec_per_100m: Reference,
}

impl Default for StrengthReference {
    fn default() -> Self {
        Self {
            bike_watts_per_kg: Reference { mean: 3.0, std: 0.6 },
            run_threshold_pace_sec_per_km: Reference {
                mean: 300.0,
                std: 45.0,
            },
            swim_css_sec_per_100m: Reference {
                mean: 110.0,
                std: 18.0,
            },
        }
    }
}

/// distance -> gender -> age band -> cohort median
pub type CohortMedians = HashMap<DistanceCategory, HashMap<String, HashMap<String, CohortMedian>>>;

/// Cold-start imputation tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImputationTables {
    pub cohort_medians: CohortMedians,
    #[serde(default)]
    pub strength_defaults: StrengthDefaults,
    #[serde(default)]
    pub transition_estimates: HashMap<DistanceCategory, TransitionEstimate>,
    /// source distance -> target distance -> finish-time ratio
    #[serde(default)]
    pub transfer_ratios: HashMap<DistanceCategory, HashMap<DistanceCategory, f64>>,
    #[serde(default)]
    pub strength_reference: StrengthReference,
}

impl ImputationTables {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|source| PredictionError::ArtifactParse {
            name: IMPUTATION_TABLES_ARTIFACT.to_string(),
            source,
        })
    }

    /// Cohort median for an exact (distance, gender, age band) key
    pub fn cohort_median(
        &self,
        distance: DistanceCategory,
        gender: Gender,
        age_band: &str,
    ) -> Option<&CohortMedian> {
        self.cohort_medians
            .get(&distance)?
            .get(gender.key())?
            .get(age_band)
    }

    /// Cohort median with fallbacks: exact key, then the default band for the
    /// same gender, then the default gender and band.
    pub fn cohort_median_or_default(
        &self,
        distance: DistanceCategory,
        gender: Gender,
        age_band: &str,
        default_gender: Gender,
        default_band: &str,
    ) -> Result<&CohortMedian> {
        self.cohort_median(distance, gender, age_band)
            .or_else(|| self.cohort_median(distance, gender, default_band))
            .or_else(|| self.cohort_median(distance, default_gender, default_band))
            .ok_or_else(|| PredictionError::UnsupportedDistance(distance.to_string()))
    }

    /// Finish-time ratio to project a result from `source` onto `target`.
    ///
    /// The matrix is asymmetric; a missing entry falls back to the inverse of
    /// the opposite direction, and a same-distance ratio is always 1.
    pub fn transfer_ratio(&self, source: DistanceCategory, target: DistanceCategory) -> Option<f64> {
        if source == target {
            return Some(1.0);
        }
        self.transfer_ratios
            .get(&source)
            .and_then(|row| row.get(&target))
            .copied()
            .or_else(|| {
                self.transfer_ratios
                    .get(&target)
                    .and_then(|row| row.get(&source))
                    .filter(|r| **r > 0.0)
                    .map(|r| 1.0 / r)
            })
    }

    pub fn transitions(&self, distance: DistanceCategory) -> Option<TransitionEstimate> {
        self.transition_estimates.get(&distance).copied()
    }
}

/// Categorical encodings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encodings {
    pub gender: HashMap<String, f64>,
    pub age_band: HashMap<String, f64>,
}

/// Ordered model features plus their encodings and defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub features: Vec<String>,
    pub encodings: Encodings,
    /// `null` marks a feature that must be imputed
    #[serde(default)]
    pub defaults: HashMap<String, Option<f64>>,
}

impl FeatureConfig {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|source| PredictionError::ArtifactParse {
            name: FEATURE_CONFIG_ARTIFACT.to_string(),
            source,
        })
    }

    pub fn default_value(&self, feature: &str) -> Option<f64> {
        self.defaults.get(feature).copied().flatten()
    }

    pub fn encode_gender(&self, gender: Gender) -> Option<f64> {
        self.encodings.gender.get(gender.key()).copied()
    }

    pub fn encode_age_band(&self, band: &str) -> Option<f64> {
        self.encodings.age_band.get(band).copied()
    }

    /// Age band label whose encoding equals `code`
    pub fn age_band_label(&self, code: f64) -> Option<&str> {
        self.encodings
            .age_band
            .iter()
            .find(|(_, v)| **v == code)
            .map(|(k, _)| k.as_str())
    }

    /// Gender whose encoding equals `code`
    pub fn gender_for_code(&self, code: f64) -> Option<Gender> {
        [Gender::Male, Gender::Female]
            .into_iter()
            .find(|g| self.encode_gender(*g) == Some(code))
    }
}

/// Course lengths of one distance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceConfig {
    pub swim_distance_m: f64,
    pub bike_distance_km: f64,
    pub run_distance_km: f64,
}

impl DistanceConfig {
    /// Standard course for a distance category
    pub fn standard(distance: DistanceCategory) -> Self {
        let (swim, bike, run) = match distance {
            DistanceCategory::Sprint => (750.0, 20.0, 5.0),
            DistanceCategory::Olympic => (1500.0, 40.0, 10.0),
            DistanceCategory::Half => (1900.0, 90.0, 21.1),
            DistanceCategory::Full => (3800.0, 180.0, 42.2),
        };
        Self {
            swim_distance_m: swim,
            bike_distance_km: bike,
            run_distance_km: run,
        }
    }
}

/// Metadata describing the trained model set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub version: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub distances: Vec<DistanceCategory>,
    #[serde(default)]
    pub distance_configs: HashMap<DistanceCategory, DistanceConfig>,
}

impl ModelMetadata {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|source| PredictionError::ArtifactParse {
            name: MODEL_METADATA_ARTIFACT.to_string(),
            source,
        })
    }

    /// Course config for a distance, falling back to the standard course
    pub fn distance_config(&self, distance: DistanceCategory) -> DistanceConfig {
        self.distance_configs
            .get(&distance)
            .copied()
            .unwrap_or_else(|| DistanceConfig::standard(distance))
    }
}
