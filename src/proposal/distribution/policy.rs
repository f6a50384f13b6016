//! Scoring Policies
//!
//! Defines how candidate distributions are compared. Lower scores are
//! better.

use crate::domain::DiskSize;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

fn default_region_penalty() -> DiskSize {
    DiskSize::gib(10)
}

fn default_preference_penalty() -> DiskSize {
    DiskSize::gib(1)
}

// =============================================================================
// Scoring Strategy
// =============================================================================

/// How the distribution metrics are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ScoringStrategy {
    /// Regions used, then wasted space, then disk preference
    #[default]
    Lexicographic,
    /// Single cost with per-region and per-rank penalties expressed as space
    Weighted,
}

impl fmt::Display for ScoringStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringStrategy::Lexicographic => write!(f, "lexicographic"),
            ScoringStrategy::Weighted => write!(f, "weighted"),
        }
    }
}

// =============================================================================
// Distribution Score
// =============================================================================

/// Comparable score of a distribution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DistributionScore([u128; 3]);

impl DistributionScore {
    pub fn components(&self) -> [u128; 3] {
        self.0
    }
}

impl fmt::Display for DistributionScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.0[0], self.0[1], self.0[2])
    }
}

// =============================================================================
// Scoring Policy
// =============================================================================

/// Configurable comparison of distributions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ScoringPolicy {
    #[serde(default)]
    pub strategy: ScoringStrategy,

    /// Cost of every region used (weighted strategy)
    #[serde(default = "default_region_penalty")]
    pub region_penalty: DiskSize,

    /// Cost of every step down the disk preference order (weighted strategy)
    #[serde(default = "default_preference_penalty")]
    pub preference_penalty: DiskSize,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            strategy: ScoringStrategy::default(),
            region_penalty: default_region_penalty(),
            preference_penalty: default_preference_penalty(),
        }
    }
}

impl ScoringPolicy {
    pub fn weighted(region_penalty: DiskSize, preference_penalty: DiskSize) -> Self {
        Self {
            strategy: ScoringStrategy::Weighted,
            region_penalty,
            preference_penalty,
        }
    }

    /// Score of a distribution with the given metrics
    pub fn score(&self, regions: usize, wasted: DiskSize, rank_sum: usize) -> DistributionScore {
        match self.strategy {
            ScoringStrategy::Lexicographic => {
                DistributionScore([regions as u128, wasted.to_bytes() as u128, rank_sum as u128])
            }
            ScoringStrategy::Weighted => {
                let cost = regions as u128 * self.region_penalty.to_bytes() as u128
                    + wasted.to_bytes() as u128
                    + rank_sum as u128 * self.preference_penalty.to_bytes() as u128;
                DistributionScore([cost, 0, 0])
            }
        }
    }

    /// Lowest score any distribution using `regions` regions can reach
    pub fn lower_bound(&self, regions: usize) -> DistributionScore {
        self.score(regions, DiskSize::ZERO, 0)
    }
}
