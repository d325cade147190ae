//! Data-Richness Tier Classification
//!
//! Maps whatever the athlete told us to a tier from 0 (nothing) to 5
//! (rich race history). The tier drives the imputation strategy and the
//! confidence label.
//!
//! Rules, highest tier wins:
//!     >= 3 prior results          -> 5
//!     any fitness metric          -> 3
//!     >= 1 prior result           -> 2
//!     gender and age both present -> 1
//!     otherwise                   -> 0

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PredictionError, Result};
use crate::models::UserInput;

/// Prior results needed for the race-history tier
const RACE_HISTORY_MIN_RESULTS: usize = 3;

/// Data-richness tier (0-5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tier(u8);

impl Tier {
    pub const NONE: Tier = Tier(0);
    pub const DEMOGRAPHICS: Tier = Tier(1);
    pub const SINGLE_RACE: Tier = Tier(2);
    pub const FITNESS_METRICS: Tier = Tier(3);
    pub const RACE_HISTORY: Tier = Tier(5);

    pub const MAX_LEVEL: u8 = 5;

    /// Build a tier from a raw level
    ///
    /// Levels above 5 can only come from a caller bug.
    pub fn new(level: u8) -> Result<Self> {
        if level > Self::MAX_LEVEL {
            return Err(PredictionError::InvalidTierInput(level));
        }
        Ok(Tier(level))
    }

    pub fn level(&self) -> u8 {
        self.0
    }

    /// Whether the tier carries at least one prior race result
    pub fn has_race_data(&self) -> bool {
        self.0 >= 2
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier {}", self.0)
    }
}

/// Classify a user input into its data-richness tier
///
/// Total and pure: every input has exactly one tier.
///
/// # Examples
/// ```
/// use tripredict::core::tier::{classify, Tier};
/// use tripredict::models::UserInput;
///
/// assert_eq!(classify(&UserInput::default()), Tier::NONE);
/// ```
pub fn classify(input: &UserInput) -> Tier {
    let results = input.prior_results.len();

    if results >= RACE_HISTORY_MIN_RESULTS {
        Tier::RACE_HISTORY
    } else if input.has_fitness_metric() {
        Tier::FITNESS_METRICS
    } else if results >= 1 {
        Tier::SINGLE_RACE
    } else if input.gender.is_some() && input.age.is_some() {
        Tier::DEMOGRAPHICS
    } else {
        Tier::NONE
    }
}
