//! Core prediction logic: tiering, tree evaluation and consistency checks

pub mod consistency;
pub mod ensemble;
pub mod tier;

// Re-export commonly used types
pub use consistency::{
    speed_to_watts, ConsistencyCheck, ConsistencyValidator, ConsistencyWarning, PhysicsConstants,
    Tolerances, ValidationReport,
};
pub use ensemble::{RegressionTree, TreeColumns, TreeEnsemble};
pub use tier::{classify, Tier};
