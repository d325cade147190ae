//! Tripredict - Triathlon race-time prediction
//!
//! This library provides:
//! - Data-richness tiering of sparse athlete profiles
//! - Cold-start feature imputation from cohort tables
//! - Pure-Rust evaluation of gradient-boosted tree ensembles
//! - A chained swim -> bike -> run pipeline with quantile intervals
//! - Physics-based consistency checks of the predicted paces and power
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tripredict::data::{FsArtifactSource, ModelRepository};
//! use tripredict::models::{DistanceCategory, UserInput};
//! use tripredict::predictor::{EngineConfig, RacePredictor};
//!
//! let repository = Arc::new(ModelRepository::new(Arc::new(FsArtifactSource::new("artifacts"))));
//! let predictor = RacePredictor::new(repository, EngineConfig::default()).unwrap();
//!
//! let prediction = predictor
//!     .predict(&UserInput::default(), DistanceCategory::Half)
//!     .unwrap();
//! println!("Predicted finish: {:.0}s ({})", prediction.total_seconds, prediction.confidence);
//! ```

pub mod core;
pub mod data;
pub mod error;
pub mod models;
pub mod predictor;

// Re-export commonly used types
pub use crate::core::{classify, Tier, ValidationReport};
pub use data::{ArtifactSource, FsArtifactSource, MemoryArtifactSource, ModelRepository};
pub use error::{PredictionError, Result};
pub use models::{
    Confidence, DistanceCategory, Gender, PriorResult, PredictRequest, PredictResponse,
    QuantileSeconds, RacePrediction, UserInput,
};
pub use predictor::{EngineConfig, RacePredictor};
