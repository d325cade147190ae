use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::consistency::{ConsistencyValidator, PhysicsConstants, Tolerances, ValidationReport};
use crate::core::tier::{classify, Tier};
use crate::data::features::{Feature, FeatureImputer, FeatureVector};
use crate::data::repository::{ModelKind, ModelRepository};
use crate::error::{PredictionError, Result};
use crate::models::{
    BikePrediction, Confidence, DistanceCategory, QuantileSeconds, RacePrediction, RunPrediction,
    SwimPrediction, Transitions, UserInput,
};

const KM_PER_MILE: f64 = 1.609344;

/// Engine-wide defaults and validator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Used for intensity factor when the athlete gave no FTP
    pub default_ftp_watts: f64,
    pub default_weight_kg: f64,
    /// Transition times used when the tables have none for a distance
    pub fallback_t1_sec: f64,
    pub fallback_t2_sec: f64,
    pub tolerances: Tolerances,
    pub physics: PhysicsConstants,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_ftp_watts: 200.0,
            default_weight_kg: 75.0,
            fallback_t1_sec: 120.0,
            fallback_t2_sec: 90.0,
            tolerances: Tolerances::default(),
            physics: PhysicsConstants::default(),
        }
    }
}

/// One step of the chained segment pipeline.
///
/// `models[0]` is the segment-time model; its output becomes `produces`.
#[derive(Debug, Clone, Copy)]
pub struct Stage {
    pub name: &'static str,
    pub models: &'static [ModelKind],
    pub consumes: &'static [Feature],
    pub produces: Option<Feature>,
}

/// swim -> bike -> run; each stage sees the times predicted before it
pub const PIPELINE: [Stage; 3] = [
    Stage {
        name: "swim",
        models: &[ModelKind::SwimSec, ModelKind::SwimPace],
        consumes: &[],
        produces: Some(Feature::SwimSecPred),
    },
    Stage {
        name: "bike",
        models: &[
            ModelKind::BikeSec,
            ModelKind::BikeWatts,
            ModelKind::BikeNormalizedPower,
        ],
        consumes: &[Feature::SwimSecPred],
        produces: Some(Feature::BikeSecPred),
    },
    Stage {
        name: "run",
        models: &[ModelKind::RunSec, ModelKind::RunPace],
        consumes: &[Feature::SwimSecPred, Feature::BikeSecPred],
        produces: None,
    },
];

/// Reject pipelines where a stage consumes something no earlier stage produces.
pub fn check_pipeline(stages: &[Stage]) -> Result<()> {
    let mut available: Vec<Feature> = Vec::new();
    for stage in stages {
        if stage.models.is_empty() {
            return Err(PredictionError::InvalidInput(format!(
                "stage {} evaluates no models",
                stage.name
            )));
        }
        if let Some(missing) = stage.consumes.iter().find(|f| !available.contains(*f)) {
            return Err(PredictionError::FeatureOrderMismatch(format!(
                "stage {} consumes {} before any stage produces it",
                stage.name,
                missing.name()
            )));
        }
        if let Some(feature) = stage.produces {
            if !feature.is_chained() {
                return Err(PredictionError::FeatureOrderMismatch(format!(
                    "stage {} produces {}, which is not a chained feature",
                    stage.name,
                    feature.name()
                )));
            }
            available.push(feature);
        }
    }
    Ok(())
}

/// Model outputs collected while walking the pipeline
#[derive(Debug, Default)]
struct StageOutputs {
    values: HashMap<ModelKind, f64>,
    chained: Vec<(Feature, f64)>,
}

impl StageOutputs {
    fn get(&self, kind: ModelKind) -> Result<f64> {
        self.values
            .get(&kind)
            .copied()
            .ok_or_else(|| PredictionError::InvalidModel {
                name: kind.to_string(),
                reason: "pipeline produced no output for this model".to_string(),
            })
    }

    /// Non-negative output, for anything measured in seconds, watts or pace
    fn non_negative(&self, kind: ModelKind) -> Result<f64> {
        Ok(self.get(kind)?.max(0.0))
    }

    fn chained(&self, feature: Feature) -> Option<f64> {
        self.chained
            .iter()
            .find(|(f, _)| *f == feature)
            .map(|(_, v)| *v)
    }
}

/// Chained race-time predictor
pub struct RacePredictor {
    repository: Arc<ModelRepository>,
    config: EngineConfig,
    validator: ConsistencyValidator,
}

impl RacePredictor {
    pub fn new(repository: Arc<ModelRepository>, config: EngineConfig) -> Result<Self> {
        check_pipeline(&PIPELINE)?;
        let validator = ConsistencyValidator::new(config.tolerances, config.physics);
        Ok(Self {
            repository,
            config,
            validator,
        })
    }

    pub fn repository(&self) -> &ModelRepository {
        &self.repository
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn evaluate(
        &self,
        kind: ModelKind,
        distance: DistanceCategory,
        features: &FeatureVector,
    ) -> Result<f64> {
        let model = self.repository.ensemble(kind, distance)?;
        let aligned = features.aligned_to(&model)?;
        Ok(model.evaluate(&aligned))
    }

    fn run_pipeline(
        &self,
        base: &FeatureVector,
        distance: DistanceCategory,
    ) -> Result<StageOutputs> {
        let mut outputs = StageOutputs::default();

        for stage in &PIPELINE {
            let mut features = base.clone();
            for feature in stage.consumes {
                let value = outputs.chained(*feature).ok_or_else(|| {
                    PredictionError::FeatureOrderMismatch(format!(
                        "stage {} needs {} which has not been predicted",
                        stage.name,
                        feature.name()
                    ))
                })?;
                features = features.with_appended(*feature, value);
            }

            for kind in stage.models {
                let value = self.evaluate(*kind, distance, &features)?;
                outputs.values.insert(*kind, value);
            }
            debug!(
                "Stage {} ({} features): {}",
                stage.name,
                features.len(),
                stage
                    .models
                    .iter()
                    .filter_map(|k| outputs.values.get(k).map(|v| format!("{}={:.1}", k, v)))
                    .collect::<Vec<_>>()
                    .join(", ")
            );

            if let Some(feature) = stage.produces {
                let seconds = outputs.non_negative(stage.models[0])?;
                outputs.chained.push((feature, seconds));
            }
        }

        Ok(outputs)
    }

    /// Quantiles from the unchained base vector, clamped and sorted
    fn quantiles(&self, base: &FeatureVector, distance: DistanceCategory) -> Result<QuantileSeconds> {
        let mut values = [0.0; 5];
        for (slot, kind) in values.iter_mut().zip(ModelKind::QUANTILES) {
            *slot = self.evaluate(kind, distance, base)?.max(0.0);
        }

        let quantiles = QuantileSeconds::from_array(values);
        if quantiles.is_monotonic() {
            return Ok(quantiles);
        }
        warn!(
            "Quantile crossing for {}: {:?}; rearranging",
            distance, values
        );
        values.sort_by(f64::total_cmp);
        Ok(QuantileSeconds::from_array(values))
    }

    /// Predict a full race for `input` at `distance`.
    ///
    /// Any missing or malformed artifact aborts the whole prediction.
    pub fn predict(&self, input: &UserInput, distance: DistanceCategory) -> Result<RacePrediction> {
        let tier = classify(input);
        let tables = self.repository.imputation_tables()?;
        let feature_config = self.repository.feature_config()?;
        let metadata = self.repository.metadata()?;

        let imputer = FeatureImputer::new(
            feature_config,
            Arc::clone(&tables),
            self.config.default_weight_kg,
        )?;
        let base = imputer.impute(input, tier, distance)?;
        debug!("{} base vector for {}: {:?}", tier, distance, base.values());

        let outputs = self.run_pipeline(&base, distance)?;
        let quantiles = self.quantiles(&base, distance)?;
        let model_total_seconds = self.evaluate(ModelKind::Total, distance, &base)?.max(0.0);

        let swim = SwimPrediction {
            seconds: outputs.non_negative(ModelKind::SwimSec)?,
            pace_per_100m: outputs.non_negative(ModelKind::SwimPace)?,
        };

        let ftp = input
            .ftp_watts
            .filter(|w| *w > 0.0)
            .unwrap_or(self.config.default_ftp_watts);
        let normalized_watts = outputs.non_negative(ModelKind::BikeNormalizedPower)?;
        let bike = BikePrediction {
            seconds: outputs.non_negative(ModelKind::BikeSec)?,
            avg_watts: outputs.non_negative(ModelKind::BikeWatts)?,
            normalized_watts,
            intensity_factor: normalized_watts / ftp,
        };

        let pace_per_km = outputs.non_negative(ModelKind::RunPace)?;
        let run = RunPrediction {
            seconds: outputs.non_negative(ModelKind::RunSec)?,
            pace_per_km,
            pace_per_mile: pace_per_km * KM_PER_MILE,
        };

        let transitions = match tables.transitions(distance) {
            Some(estimate) => Transitions {
                t1: estimate.t1.max(0.0),
                t2: estimate.t2.max(0.0),
            },
            None => Transitions {
                t1: self.config.fallback_t1_sec,
                t2: self.config.fallback_t2_sec,
            },
        };

        let total_seconds = swim.seconds + bike.seconds + run.seconds + transitions.t1 + transitions.t2;

        info!(
            "Predicted {} at {}: {:.0}s (whole-race model {:.0}s, p05 {:.0}s, p95 {:.0}s)",
            distance, tier, total_seconds, model_total_seconds, quantiles.p05, quantiles.p95
        );

        Ok(RacePrediction {
            distance,
            total_seconds,
            model_total_seconds,
            quantiles,
            swim,
            bike,
            run,
            transitions,
            confidence: Confidence::from_tier(tier),
            tier,
            model_version: metadata.version.clone(),
            generated_at: Utc::now(),
        })
    }

    /// Cross-check a prediction; never alters it.
    pub fn validate(
        &self,
        prediction: &RacePrediction,
        weight_kg: Option<f64>,
    ) -> Result<ValidationReport> {
        let metadata = self.repository.metadata()?;
        let course = metadata.distance_config(prediction.distance);
        let weight = weight_kg
            .filter(|w| *w > 0.0)
            .unwrap_or(self.config.default_weight_kg);
        Ok(self.validator.validate(prediction, &course, weight))
    }

    /// Predict, then validate and log every consistency warning.
    pub fn predict_with_validation(
        &self,
        input: &UserInput,
        distance: DistanceCategory,
    ) -> Result<(RacePrediction, ValidationReport)> {
        let prediction = self.predict(input, distance)?;
        let report = self.validate(&prediction, input.weight_kg)?;
        for warning in &report.warnings {
            warn!("Consistency check failed for {}: {}", distance, warning);
        }
        Ok((prediction, report))
    }

    /// Tier and confidence label without running any model
    pub fn tier(&self, input: &UserInput) -> (Tier, Confidence) {
        let tier = classify(input);
        (tier, Confidence::from_tier(tier))
    }
}
