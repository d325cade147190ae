//! Model repository
//!
//! Owns an artifact source and the parsed-artifact caches. Share one
//! repository (behind an `Arc`) across every predictor in the process;
//! build a fresh one to start with a cold cache.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use super::artifacts::ArtifactSource;
use super::cache::SingleFlightCache;
use super::tables::{
    FeatureConfig, ImputationTables, ModelMetadata, FEATURE_CONFIG_ARTIFACT,
    IMPUTATION_TABLES_ARTIFACT, MODEL_METADATA_ARTIFACT,
};
use crate::core::ensemble::TreeEnsemble;
use crate::error::Result;
use crate::models::DistanceCategory;

/// Every ensemble the pipeline evaluates for one distance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    SwimSec,
    SwimPace,
    BikeSec,
    BikeWatts,
    BikeNormalizedPower,
    RunSec,
    RunPace,
    /// Whole-race finish time, used only to cross-check the segment sum
    Total,
    QuantileP05,
    QuantileP25,
    QuantileP50,
    QuantileP75,
    QuantileP95,
}

impl ModelKind {
    pub const ALL: [ModelKind; 13] = [
        ModelKind::SwimSec,
        ModelKind::SwimPace,
        ModelKind::BikeSec,
        ModelKind::BikeWatts,
        ModelKind::BikeNormalizedPower,
        ModelKind::RunSec,
        ModelKind::RunPace,
        ModelKind::Total,
        ModelKind::QuantileP05,
        ModelKind::QuantileP25,
        ModelKind::QuantileP50,
        ModelKind::QuantileP75,
        ModelKind::QuantileP95,
    ];

    pub const QUANTILES: [ModelKind; 5] = [
        ModelKind::QuantileP05,
        ModelKind::QuantileP25,
        ModelKind::QuantileP50,
        ModelKind::QuantileP75,
        ModelKind::QuantileP95,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            ModelKind::SwimSec => "swim_sec",
            ModelKind::SwimPace => "swim_pace",
            ModelKind::BikeSec => "bike_sec",
            ModelKind::BikeWatts => "bike_watts",
            ModelKind::BikeNormalizedPower => "bike_np",
            ModelKind::RunSec => "run_sec",
            ModelKind::RunPace => "run_pace",
            ModelKind::Total => "total",
            ModelKind::QuantileP05 => "quantile_p05",
            ModelKind::QuantileP25 => "quantile_p25",
            ModelKind::QuantileP50 => "quantile_p50",
            ModelKind::QuantileP75 => "quantile_p75",
            ModelKind::QuantileP95 => "quantile_p95",
        }
    }

    /// Artifact name, e.g. `bike_np_70.3.json`
    pub fn artifact_name(&self, distance: DistanceCategory) -> String {
        format!("{}_{}.json", self.key(), distance.key())
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Lazily loaded, process-wide shared models and tables
pub struct ModelRepository {
    source: Arc<dyn ArtifactSource>,
    ensembles: SingleFlightCache<TreeEnsemble>,
    imputation: SingleFlightCache<ImputationTables>,
    features: SingleFlightCache<FeatureConfig>,
    metadata: SingleFlightCache<ModelMetadata>,
}

impl ModelRepository {
    pub fn new(source: Arc<dyn ArtifactSource>) -> Self {
        Self {
            source,
            ensembles: SingleFlightCache::new(),
            imputation: SingleFlightCache::new(),
            features: SingleFlightCache::new(),
            metadata: SingleFlightCache::new(),
        }
    }

    pub fn source(&self) -> &dyn ArtifactSource {
        self.source.as_ref()
    }

    pub fn ensemble(&self, kind: ModelKind, distance: DistanceCategory) -> Result<Arc<TreeEnsemble>> {
        let name = kind.artifact_name(distance);
        self.ensembles.get_or_load(&name, || {
            let bytes = self.source.load(&name)?;
            let model = TreeEnsemble::from_json(&name, &bytes)?;
            info!(
                "Loaded {} ({} trees, max depth {}, {} features)",
                name,
                model.n_trees(),
                model.max_depth(),
                model.num_features()
            );
            Ok(model)
        })
    }

    pub fn imputation_tables(&self) -> Result<Arc<ImputationTables>> {
        self.imputation.get_or_load(IMPUTATION_TABLES_ARTIFACT, || {
            let tables = ImputationTables::from_json(&self.source.load(IMPUTATION_TABLES_ARTIFACT)?)?;
            info!(
                "Loaded {} ({} distances)",
                IMPUTATION_TABLES_ARTIFACT,
                tables.cohort_medians.len()
            );
            Ok(tables)
        })
    }

    pub fn feature_config(&self) -> Result<Arc<FeatureConfig>> {
        self.features.get_or_load(FEATURE_CONFIG_ARTIFACT, || {
            let config = FeatureConfig::from_json(&self.source.load(FEATURE_CONFIG_ARTIFACT)?)?;
            info!(
                "Loaded {} ({} features)",
                FEATURE_CONFIG_ARTIFACT,
                config.features.len()
            );
            Ok(config)
        })
    }

    pub fn metadata(&self) -> Result<Arc<ModelMetadata>> {
        self.metadata.get_or_load(MODEL_METADATA_ARTIFACT, || {
            let metadata = ModelMetadata::from_json(&self.source.load(MODEL_METADATA_ARTIFACT)?)?;
            info!("Loaded {} (version {})", MODEL_METADATA_ARTIFACT, metadata.version);
            Ok(metadata)
        })
    }

    /// Load every artifact a distance needs; fails on the first missing one.
    pub fn preload(&self, distance: DistanceCategory) -> Result<()> {
        self.imputation_tables()?;
        self.feature_config()?;
        self.metadata()?;
        for kind in ModelKind::ALL {
            self.ensemble(kind, distance)?;
        }
        Ok(())
    }

    pub fn cached_ensembles(&self) -> usize {
        self.ensembles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::artifacts::MemoryArtifactSource;
    use crate::error::PredictionError;

    #[test]
    fn test_artifact_names() {
        assert_eq!(
            ModelKind::BikeNormalizedPower.artifact_name(DistanceCategory::Half),
            "bike_np_70.3.json"
        );
        assert_eq!(
            ModelKind::QuantileP05.artifact_name(DistanceCategory::Sprint),
            "quantile_p05_sprint.json"
        );
        assert_eq!(ModelKind::Total.artifact_name(DistanceCategory::Full), "total_140.6.json");
    }

    #[test]
    fn test_missing_artifact_is_load_error() {
        let repo = ModelRepository::new(Arc::new(MemoryArtifactSource::new()));
        let err = repo
            .ensemble(ModelKind::SwimSec, DistanceCategory::Olympic)
            .unwrap_err();
        assert!(matches!(err, PredictionError::ArtifactLoad { .. }));
        assert_eq!(repo.cached_ensembles(), 0);
    }

    #[test]
    fn test_tables_cached_after_first_load() {
        let source = Arc::new(MemoryArtifactSource::new());
        source.insert(
            FEATURE_CONFIG_ARTIFACT,
            include_str!("../../artifacts/feature_config.json"),
        );
        let repo = ModelRepository::new(source.clone());

        let first = repo.feature_config().unwrap();
        source.remove(FEATURE_CONFIG_ARTIFACT);
        let second = repo.feature_config().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
