//! Feature Imputation
//!
//! Builds the fixed-order numeric feature vector the ensembles expect, filling
//! every slot even for athletes who told us nothing.
//!
//! Strategy by tier:
//!     0    global default cohort median (default gender and age band)
//!     1    cohort median for (distance, gender, 5-year age band)
//!     2    tier 1, with the baseline replaced by the best prior finish
//!          projected onto the target distance
//!     3-5  tier 2 (tier 1 without prior races), plus strength z-scores
//!          derived from FTP, threshold pace and CSS; tier 5 also
//!          derives consistency from the race history

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::ensemble::TreeEnsemble;
use crate::core::tier::Tier;
use crate::data::tables::{FeatureConfig, ImputationTables, Reference};
use crate::error::{PredictionError, Result};
use crate::models::{DistanceCategory, Gender, UserInput};

/// z-scores are clamped to this magnitude
const MAX_STRENGTH_Z: f64 = 3.0;
/// Results needed before a consistency estimate is meaningful
const MIN_RESULTS_FOR_CONSISTENCY: usize = 3;

/// Every feature name the imputer knows how to fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    PbTotalSec,
    GenderEnc,
    AgeBand,
    RunStrengthZ,
    BikeStrengthZ,
    SwimStrengthZ,
    TotalRaces,
    ConsistencyCv,
    ImprovementSlope,
    DnfRate,
    ClusterId,
    CountryEnc,
    Year,
    SwimSecPred,
    BikeSecPred,
}

impl Feature {
    pub fn name(&self) -> &'static str {
        match self {
            Feature::PbTotalSec => "pb_total_sec",
            Feature::GenderEnc => "gender_enc",
            Feature::AgeBand => "age_band",
            Feature::RunStrengthZ => "run_strength_z",
            Feature::BikeStrengthZ => "bike_strength_z",
            Feature::SwimStrengthZ => "swim_strength_z",
            Feature::TotalRaces => "total_races",
            Feature::ConsistencyCv => "consistency_cv",
            Feature::ImprovementSlope => "improvement_slope",
            Feature::DnfRate => "dnf_rate",
            Feature::ClusterId => "cluster_id",
            Feature::CountryEnc => "country_enc",
            Feature::Year => "year",
            Feature::SwimSecPred => "swim_sec_pred",
            Feature::BikeSecPred => "bike_sec_pred",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let feature = match name {
            "pb_total_sec" => Feature::PbTotalSec,
            "gender_enc" => Feature::GenderEnc,
            "age_band" => Feature::AgeBand,
            "run_strength_z" => Feature::RunStrengthZ,
            "bike_strength_z" => Feature::BikeStrengthZ,
            "swim_strength_z" => Feature::SwimStrengthZ,
            "total_races" => Feature::TotalRaces,
            "consistency_cv" => Feature::ConsistencyCv,
            "improvement_slope" => Feature::ImprovementSlope,
            "dnf_rate" => Feature::DnfRate,
            "cluster_id" => Feature::ClusterId,
            "country_enc" => Feature::CountryEnc,
            "year" => Feature::Year,
            "swim_sec_pred" => Feature::SwimSecPred,
            "bike_sec_pred" => Feature::BikeSecPred,
            _ => return None,
        };
        Some(feature)
    }

    /// Produced by an upstream segment model rather than imputed
    pub fn is_chained(&self) -> bool {
        matches!(self, Feature::SwimSecPred | Feature::BikeSecPred)
    }

    /// Value used when neither input nor feature config supplies one
    fn builtin_default(&self) -> f64 {
        match self {
            Feature::TotalRaces => 1.0,
            Feature::ConsistencyCv => 0.15,
            Feature::Year => 2024.0,
            _ => 0.0,
        }
    }
}

/// 5-year age band label, with everything under 25 and 75+ capped.
///
/// # Examples
/// ```
/// use tripredict::data::features::age_band_label;
///
/// assert_eq!(age_band_label(19), "18-24");
/// assert_eq!(age_band_label(37), "35-39");
/// assert_eq!(age_band_label(81), "75+");
/// ```
pub fn age_band_label(age: u32) -> String {
    match age {
        0..=24 => "18-24".to_string(),
        75.. => "75+".to_string(),
        a => {
            let low = a / 5 * 5;
            format!("{}-{}", low, low + 4)
        }
    }
}

/// Named, ordered, fully-populated feature values
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    names: Vec<String>,
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn new(names: Vec<String>, values: Vec<f64>) -> Result<Self> {
        if names.len() != values.len() {
            return Err(PredictionError::FeatureOrderMismatch(format!(
                "{} names for {} values",
                names.len(),
                values.len()
            )));
        }
        Ok(Self { names, values })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, feature: Feature) -> Option<f64> {
        self.position(feature.name()).map(|i| self.values[i])
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Copy with one extra feature at the end
    pub fn with_appended(&self, feature: Feature, value: f64) -> Self {
        let mut next = self.clone();
        next.names.push(feature.name().to_string());
        next.values.push(value);
        next
    }

    /// Values laid out in the model's declared feature order.
    ///
    /// Every declared name must be a known feature present in this vector.
    /// Models without declared names must match the vector length exactly.
    pub fn aligned_to(&self, model: &TreeEnsemble) -> Result<Vec<f64>> {
        let declared = model.feature_names();
        if declared.is_empty() {
            if model.num_features() != self.len() {
                return Err(PredictionError::FeatureOrderMismatch(format!(
                    "{} expects {} features, vector has {}",
                    model.name(),
                    model.num_features(),
                    self.len()
                )));
            }
            return Ok(self.values.clone());
        }
        if declared == self.names.as_slice() {
            return Ok(self.values.clone());
        }

        declared
            .iter()
            .map(|name| {
                if Feature::from_name(name).is_none() {
                    return Err(PredictionError::FeatureOrderMismatch(format!(
                        "{} declares unrecognized feature {}",
                        model.name(),
                        name
                    )));
                }
                self.position(name).map(|i| self.values[i]).ok_or_else(|| {
                    PredictionError::FeatureOrderMismatch(format!(
                        "{} expects feature {} which is not available at this stage",
                        model.name(),
                        name
                    ))
                })
            })
            .collect()
    }
}

/// Builds base feature vectors from sparse user input
pub struct FeatureImputer {
    config: Arc<FeatureConfig>,
    tables: Arc<ImputationTables>,
    default_weight_kg: f64,
    base_features: Vec<Feature>,
}

impl FeatureImputer {
    /// Resolve the configured feature order; unknown or chained names fail.
    pub fn new(
        config: Arc<FeatureConfig>,
        tables: Arc<ImputationTables>,
        default_weight_kg: f64,
    ) -> Result<Self> {
        let base_features = config
            .features
            .iter()
            .map(|name| match Feature::from_name(name) {
                Some(f) if f.is_chained() => Err(PredictionError::FeatureOrderMismatch(format!(
                    "chained feature {} cannot be part of the base feature list",
                    name
                ))),
                Some(f) => Ok(f),
                None => Err(PredictionError::FeatureOrderMismatch(format!(
                    "feature config lists unrecognized feature {}",
                    name
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            config,
            tables,
            default_weight_kg,
            base_features,
        })
    }

    fn default_gender(&self) -> Gender {
        self.config
            .default_value(Feature::GenderEnc.name())
            .and_then(|code| self.config.gender_for_code(code))
            .unwrap_or(Gender::Male)
    }

    fn default_band(&self) -> String {
        self.config
            .default_value(Feature::AgeBand.name())
            .and_then(|code| self.config.age_band_label(code))
            .unwrap_or("30-34")
            .to_string()
    }

    fn configured_default(&self, feature: Feature) -> f64 {
        self.config
            .default_value(feature.name())
            .unwrap_or_else(|| feature.builtin_default())
    }

    /// Prior finishes projected onto the target distance
    fn projected_finishes(&self, input: &UserInput, target: DistanceCategory) -> Vec<f64> {
        input
            .prior_results
            .iter()
            .filter(|r| r.finish_seconds > 0.0)
            .filter_map(|r| {
                self.tables
                    .transfer_ratio(r.distance, target)
                    .map(|ratio| r.finish_seconds * ratio)
            })
            .collect()
    }

    fn strength_z(value: f64, reference: &Reference, lower_is_stronger: bool) -> Option<f64> {
        if reference.std <= 0.0 || !value.is_finite() {
            return None;
        }
        let z = if lower_is_stronger {
            (reference.mean - value) / reference.std
        } else {
            (value - reference.mean) / reference.std
        };
        Some(z.clamp(-MAX_STRENGTH_Z, MAX_STRENGTH_Z))
    }

    /// Build the base feature vector for `input` at `tier`.
    pub fn impute(
        &self,
        input: &UserInput,
        tier: Tier,
        target: DistanceCategory,
    ) -> Result<FeatureVector> {
        let default_gender = self.default_gender();
        let default_band = self.default_band();

        let (gender, band) = if tier == Tier::NONE {
            (default_gender, default_band.clone())
        } else {
            (
                input.gender.unwrap_or(default_gender),
                input
                    .age
                    .map(age_band_label)
                    .unwrap_or_else(|| default_band.clone()),
            )
        };

        let cohort = self.tables.cohort_median_or_default(
            target,
            gender,
            &band,
            default_gender,
            &default_band,
        )?;
        let mut baseline = cohort.total_sec;

        let projected = if tier.has_race_data() {
            self.projected_finishes(input, target)
        } else {
            Vec::new()
        };
        if let Some(best) = projected.iter().copied().reduce(f64::min) {
            baseline = best;
        }

        let mut strengths = self.tables.strength_defaults;
        if tier >= Tier::FITNESS_METRICS {
            let reference = &self.tables.strength_reference;
            if let Some(ftp) = input.ftp_watts {
                let weight = input.weight_kg.unwrap_or(self.default_weight_kg);
                if let Some(z) = Self::strength_z(ftp / weight, &reference.bike_watts_per_kg, false) {
                    strengths.bike_strength_z = z;
                }
            }
            if let Some(pace) = input.threshold_pace_sec_per_km {
                if let Some(z) =
                    Self::strength_z(pace, &reference.run_threshold_pace_sec_per_km, true)
                {
                    strengths.run_strength_z = z;
                }
            }
            if let Some(css) = input.css_sec_per_100m {
                if let Some(z) = Self::strength_z(css, &reference.swim_css_sec_per_100m, true) {
                    strengths.swim_strength_z = z;
                }
            }
        }

        let consistency = if tier == Tier::RACE_HISTORY && projected.len() >= MIN_RESULTS_FOR_CONSISTENCY
        {
            coefficient_of_variation(&projected)
        } else {
            None
        };

        let mut names = Vec::with_capacity(self.base_features.len());
        let mut values = Vec::with_capacity(self.base_features.len());
        for feature in &self.base_features {
            let value = match feature {
                Feature::PbTotalSec => baseline,
                Feature::GenderEnc => self
                    .config
                    .encode_gender(gender)
                    .unwrap_or_else(|| self.configured_default(*feature)),
                Feature::AgeBand => self
                    .config
                    .encode_age_band(&band)
                    .unwrap_or_else(|| self.configured_default(*feature)),
                Feature::RunStrengthZ => strengths.run_strength_z,
                Feature::BikeStrengthZ => strengths.bike_strength_z,
                Feature::SwimStrengthZ => strengths.swim_strength_z,
                Feature::TotalRaces if !projected.is_empty() => projected.len() as f64,
                Feature::ConsistencyCv => {
                    consistency.unwrap_or_else(|| self.configured_default(*feature))
                }
                other => self.configured_default(*other),
            };
            names.push(feature.name().to_string());
            values.push(value);
        }

        FeatureVector::new(names, values)
    }
}

/// Standard deviation over mean; `None` for degenerate samples
fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return None;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt() / mean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tier::classify;
    use crate::models::PriorResult;

    fn imputer() -> FeatureImputer {
        let config = FeatureConfig::from_json(
            include_str!("../../artifacts/feature_config.json").as_bytes(),
        )
        .unwrap();
        let tables = ImputationTables::from_json(
            include_str!("../../artifacts/imputation_tables.json").as_bytes(),
        )
        .unwrap();
        FeatureImputer::new(Arc::new(config), Arc::new(tables), 75.0).unwrap()
    }

    fn impute(input: &UserInput, target: DistanceCategory) -> FeatureVector {
        imputer().impute(input, classify(input), target).unwrap()
    }

    #[test]
    fn test_age_band_labels() {
        assert_eq!(age_band_label(0), "18-24");
        assert_eq!(age_band_label(24), "18-24");
        assert_eq!(age_band_label(25), "25-29");
        assert_eq!(age_band_label(74), "70-74");
        assert_eq!(age_band_label(75), "75+");
    }

    #[test]
    fn test_tier_zero_uses_global_default_cohort() {
        let vector = impute(&UserInput::default(), DistanceCategory::Half);
        assert_eq!(vector.len(), 13);
        assert_eq!(vector.get(Feature::PbTotalSec), Some(19800.0));
        assert_eq!(vector.get(Feature::GenderEnc), Some(1.0));
        assert_eq!(vector.get(Feature::AgeBand), Some(2.0));
        assert_eq!(vector.get(Feature::Year), Some(2024.0));
        assert!(vector.values().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_tier_zero_ignores_partial_demographics() {
        let input = UserInput {
            gender: Some(Gender::Female),
            ..Default::default()
        };
        let vector = impute(&input, DistanceCategory::Half);
        assert_eq!(vector.get(Feature::PbTotalSec), Some(19800.0));
    }

    #[test]
    fn test_tier_one_uses_demographic_cohort() {
        let input = UserInput {
            gender: Some(Gender::Female),
            age: Some(52),
            ..Default::default()
        };
        let vector = impute(&input, DistanceCategory::Olympic);
        let imputer = imputer();
        let expected = imputer
            .tables
            .cohort_median(DistanceCategory::Olympic, Gender::Female, "50-54")
            .unwrap()
            .total_sec;
        assert_eq!(vector.get(Feature::PbTotalSec), Some(expected));
        assert_eq!(vector.get(Feature::GenderEnc), Some(0.0));
        assert_eq!(vector.get(Feature::AgeBand), Some(6.0));
    }

    #[test]
    fn test_tier_two_projects_prior_result() {
        let input = UserInput {
            prior_results: vec![PriorResult {
                distance: DistanceCategory::Olympic,
                finish_seconds: 9000.0,
            }],
            ..Default::default()
        };
        let imputer = imputer();
        let ratio = imputer
            .tables
            .transfer_ratio(DistanceCategory::Olympic, DistanceCategory::Half)
            .unwrap();
        let vector = imputer.impute(&input, Tier::SINGLE_RACE, DistanceCategory::Half).unwrap();
        assert!((vector.get(Feature::PbTotalSec).unwrap() - 9000.0 * ratio).abs() < 1e-6);
        assert_eq!(vector.get(Feature::TotalRaces), Some(1.0));
    }

    #[test]
    fn test_tier_two_uses_best_projection() {
        let input = UserInput {
            prior_results: vec![
                PriorResult {
                    distance: DistanceCategory::Half,
                    finish_seconds: 21000.0,
                },
                PriorResult {
                    distance: DistanceCategory::Half,
                    finish_seconds: 20000.0,
                },
            ],
            ..Default::default()
        };
        let vector = impute(&input, DistanceCategory::Half);
        assert_eq!(vector.get(Feature::PbTotalSec), Some(20000.0));
        assert_eq!(vector.get(Feature::TotalRaces), Some(2.0));
        assert_eq!(vector.get(Feature::ConsistencyCv), Some(0.15));
    }

    #[test]
    fn test_fitness_metrics_shift_strength_scores() {
        let input = UserInput {
            ftp_watts: Some(300.0),
            weight_kg: Some(70.0),
            threshold_pace_sec_per_km: Some(240.0),
            css_sec_per_100m: Some(150.0),
            ..Default::default()
        };
        let vector = impute(&input, DistanceCategory::Olympic);
        assert!(vector.get(Feature::BikeStrengthZ).unwrap() > 0.0);
        assert!(vector.get(Feature::RunStrengthZ).unwrap() > 0.0);
        assert!(vector.get(Feature::SwimStrengthZ).unwrap() < 0.0);
    }

    #[test]
    fn test_strength_scores_are_clamped() {
        let input = UserInput {
            ftp_watts: Some(2000.0),
            weight_kg: Some(50.0),
            ..Default::default()
        };
        let vector = impute(&input, DistanceCategory::Sprint);
        assert_eq!(vector.get(Feature::BikeStrengthZ), Some(MAX_STRENGTH_Z));
    }

    #[test]
    fn test_race_history_sets_consistency() {
        let results = [9000.0, 9300.0, 9600.0]
            .iter()
            .map(|s| PriorResult {
                distance: DistanceCategory::Olympic,
                finish_seconds: *s,
            })
            .collect();
        let input = UserInput {
            prior_results: results,
            ..Default::default()
        };
        let vector = impute(&input, DistanceCategory::Olympic);
        let cv = vector.get(Feature::ConsistencyCv).unwrap();
        assert!((cv - 300.0 / 9300.0).abs() < 1e-9);
        assert_eq!(vector.get(Feature::PbTotalSec), Some(9000.0));
        assert_eq!(vector.get(Feature::TotalRaces), Some(3.0));
    }

    #[test]
    fn test_unknown_config_feature_fails_loudly() {
        let mut config = FeatureConfig::from_json(
            include_str!("../../artifacts/feature_config.json").as_bytes(),
        )
        .unwrap();
        config.features.push("vo2max".to_string());
        let tables = imputer().tables.clone();
        let err = FeatureImputer::new(Arc::new(config), tables, 75.0).err().unwrap();
        assert!(matches!(err, PredictionError::FeatureOrderMismatch(_)));
    }

    #[test]
    fn test_chained_feature_in_base_list_rejected() {
        let mut config = FeatureConfig::from_json(
            include_str!("../../artifacts/feature_config.json").as_bytes(),
        )
        .unwrap();
        config.features.push("swim_sec_pred".to_string());
        let tables = imputer().tables.clone();
        assert!(FeatureImputer::new(Arc::new(config), tables, 75.0).is_err());
    }

    #[test]
    fn test_aligned_to_reorders_by_name() {
        let vector = FeatureVector::new(
            vec!["pb_total_sec".to_string(), "year".to_string()],
            vec![9000.0, 2024.0],
        )
        .unwrap();
        let model = TreeEnsemble::new(
            "m",
            vec![],
            0.0,
            2,
            vec!["year".to_string(), "pb_total_sec".to_string()],
        )
        .unwrap();
        assert_eq!(vector.aligned_to(&model).unwrap(), vec![2024.0, 9000.0]);
    }

    #[test]
    fn test_aligned_to_rejects_unrecognized_name() {
        let vector = FeatureVector::new(vec!["year".to_string()], vec![2024.0]).unwrap();
        let model = TreeEnsemble::new("m", vec![], 0.0, 1, vec!["hr_max".to_string()]).unwrap();
        let err = vector.aligned_to(&model).unwrap_err();
        assert!(err.to_string().contains("hr_max"));
    }

    #[test]
    fn test_aligned_to_rejects_feature_from_later_stage() {
        let vector = FeatureVector::new(vec!["year".to_string()], vec![2024.0]).unwrap();
        let model =
            TreeEnsemble::new("m", vec![], 0.0, 1, vec!["bike_sec_pred".to_string()]).unwrap();
        assert!(vector.aligned_to(&model).is_err());
    }

    #[test]
    fn test_aligned_to_checks_length_without_names() {
        let vector = FeatureVector::new(vec!["year".to_string()], vec![2024.0]).unwrap();
        let model = TreeEnsemble::new("m", vec![], 0.0, 2, vec![]).unwrap();
        assert!(vector.aligned_to(&model).is_err());
    }

    #[test]
    fn test_with_appended_keeps_original() {
        let vector = FeatureVector::new(vec!["year".to_string()], vec![2024.0]).unwrap();
        let chained = vector.with_appended(Feature::SwimSecPred, 1800.0);
        assert_eq!(vector.len(), 1);
        assert_eq!(chained.len(), 2);
        assert_eq!(chained.get(Feature::SwimSecPred), Some(1800.0));
    }

    #[test]
    fn test_coefficient_of_variation() {
        assert_eq!(coefficient_of_variation(&[1.0]), None);
        assert_eq!(coefficient_of_variation(&[5.0, 5.0, 5.0]), Some(0.0));
    }
}
