//! Space Distribution
//!
//! Assignment of planned devices to free regions: the per-region
//! bookkeeping, the scoring policy and the search that picks the best
//! distribution.

pub mod assigned_space;
pub mod partitions;
pub mod policy;
pub mod solver;

pub use assigned_space::{distribute_surplus, AssignedSpace};
pub use partitions::PartitionsDistribution;
pub use policy::{DistributionScore, ScoringPolicy, ScoringStrategy};
pub use solver::{SearchBudget, Solved, SpaceDistributionSolver};
