//! Artifact loading, lookup tables and feature imputation

pub mod artifacts;
pub mod cache;
pub mod features;
pub mod repository;
pub mod tables;

// Re-export commonly used types
#[cfg(feature = "remote")]
pub use artifacts::{HttpArtifactSource, HttpSourceConfig};
pub use artifacts::{ArtifactSource, FsArtifactSource, MemoryArtifactSource};
pub use cache::SingleFlightCache;
pub use features::{age_band_label, Feature, FeatureImputer, FeatureVector};
pub use repository::{ModelKind, ModelRepository};
pub use tables::{DistanceConfig, FeatureConfig, ImputationTables, ModelMetadata};
