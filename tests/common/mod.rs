//! Shared in-memory artifact fixtures

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use tripredict::data::tables::{
    FEATURE_CONFIG_ARTIFACT, IMPUTATION_TABLES_ARTIFACT, MODEL_METADATA_ARTIFACT,
};
use tripredict::data::{ArtifactSource, MemoryArtifactSource, ModelKind, ModelRepository};
use tripredict::error::Result;
use tripredict::models::DistanceCategory;
use tripredict::predictor::{EngineConfig, RacePredictor};

pub const FEATURE_CONFIG: &str = include_str!("../../artifacts/feature_config.json");
pub const IMPUTATION_TABLES: &str = include_str!("../../artifacts/imputation_tables.json");
pub const MODEL_METADATA: &str = include_str!("../../artifacts/model_metadata.json");

/// Base feature names in configured order
pub fn base_names() -> Vec<String> {
    let config: serde_json::Value = serde_json::from_str(FEATURE_CONFIG).unwrap();
    config["features"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect()
}

pub fn with_swim(names: &[String]) -> Vec<String> {
    let mut names = names.to_vec();
    names.push("swim_sec_pred".to_string());
    names
}

pub fn with_swim_and_bike(names: &[String]) -> Vec<String> {
    let mut names = with_swim(names);
    names.push("bike_sec_pred".to_string());
    names
}

fn model_json(names: &[String], base_score: f64, trees: serde_json::Value) -> Vec<u8> {
    json!({
        "learner": {
            "feature_names": names,
            "learner_model_param": {
                "base_score": format!("[{:E}]", base_score),
                "num_feature": names.len().to_string()
            },
            "gradient_booster": { "model": { "trees": trees } }
        }
    })
    .to_string()
    .into_bytes()
}

/// Model that returns `value` for every input
pub fn constant_model(value: f64, names: &[String]) -> Vec<u8> {
    model_json(
        names,
        value,
        json!([{
            "left_children": [-1],
            "right_children": [-1],
            "split_indices": [0],
            "split_conditions": [0.0],
            "default_left": [0]
        }]),
    )
}

/// One split on `feature`: below `threshold` scores `left`, otherwise `right`
pub fn stump_model(names: &[String], feature: &str, threshold: f64, left: f64, right: f64) -> Vec<u8> {
    let index = names
        .iter()
        .position(|n| n == feature)
        .unwrap_or_else(|| panic!("{} not among model features", feature));
    model_json(
        names,
        0.0,
        json!([{
            "left_children": [1, -1, -1],
            "right_children": [2, -1, -1],
            "split_indices": [index, 0, 0],
            "split_conditions": [threshold, left, right],
            "default_left": [true, false, false]
        }]),
    )
}

/// Tables plus a full, internally consistent model set for `distance`.
///
/// Segment models ignore their inputs; quantile models step on the
/// baseline finish time so different athletes get different intervals.
pub fn fixture(distance: DistanceCategory) -> Arc<MemoryArtifactSource> {
    let source = Arc::new(MemoryArtifactSource::new());
    add_tables(&source);

    let base = base_names();
    let swim = with_swim(&base);
    let bike = with_swim_and_bike(&base);

    source.insert(ModelKind::SwimSec.artifact_name(distance), constant_model(2090.0, &base));
    source.insert(ModelKind::SwimPace.artifact_name(distance), constant_model(110.0, &base));
    source.insert(ModelKind::BikeSec.artifact_name(distance), constant_model(10800.0, &swim));
    source.insert(ModelKind::BikeWatts.artifact_name(distance), constant_model(175.0, &swim));
    source.insert(
        ModelKind::BikeNormalizedPower.artifact_name(distance),
        constant_model(185.0, &swim),
    );
    source.insert(ModelKind::RunSec.artifact_name(distance), constant_model(6330.0, &bike));
    source.insert(ModelKind::RunPace.artifact_name(distance), constant_model(300.0, &bike));
    // segments plus the 180/120 s transitions for 70.3
    source.insert(ModelKind::Total.artifact_name(distance), constant_model(19520.0, &base));

    let quantiles = [
        (ModelKind::QuantileP05, 17000.0, 18000.0),
        (ModelKind::QuantileP25, 18500.0, 19000.0),
        (ModelKind::QuantileP50, 19200.0, 19800.0),
        (ModelKind::QuantileP75, 20100.0, 20600.0),
        (ModelKind::QuantileP95, 21500.0, 22400.0),
    ];
    for (kind, fast, slow) in quantiles {
        source.insert(
            kind.artifact_name(distance),
            stump_model(&base, "pb_total_sec", 19000.0, fast, slow),
        );
    }
    source
}

pub fn add_tables(source: &MemoryArtifactSource) {
    source.insert(FEATURE_CONFIG_ARTIFACT, FEATURE_CONFIG);
    source.insert(IMPUTATION_TABLES_ARTIFACT, IMPUTATION_TABLES);
    source.insert(MODEL_METADATA_ARTIFACT, MODEL_METADATA);
}

pub fn predictor(source: Arc<dyn ArtifactSource>) -> RacePredictor {
    RacePredictor::new(
        Arc::new(ModelRepository::new(source)),
        EngineConfig::default(),
    )
    .unwrap()
}

/// Source wrapper that counts every load
pub struct CountingSource {
    pub inner: Arc<MemoryArtifactSource>,
    pub loads: AtomicUsize,
}

impl CountingSource {
    pub fn new(inner: Arc<MemoryArtifactSource>) -> Self {
        Self {
            inner,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ArtifactSource for CountingSource {
    fn load(&self, name: &str) -> Result<Vec<u8>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(name)
    }

    fn describe(&self) -> String {
        format!("counting {}", self.inner.describe())
    }
}
