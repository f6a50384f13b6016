//! Guided Proposal Engine
//!
//! Computes where new partitions, physical volumes and logical volumes go.
//!
//! # Pipeline
//!
//! ```text
//! settings ──► space maker ──► FreeSpaceScanner ──► free space catalogue
//!                                                         │
//!         PlannedDeviceSet (per sizing target) ──► SpaceDistributionSolver
//!                                                         │
//!                 TargetRetryController ◄── NoDiskSpace / NoMorePartitionSlot
//!                                                         │
//!                                     mutator ──► boot validator ──► Proposal
//! ```

pub mod boot;
pub mod controller;
pub mod distribution;
pub mod free_space;
pub mod guided;
pub mod metrics;
pub mod mutator;
pub mod planned;
pub mod settings;
pub mod space_maker;
pub mod target;

pub use boot::{NoopBootValidator, RequireEspValidator};
pub use controller::{ControllerState, ProposedAttempt, TargetRetryController};
pub use distribution::{
    AssignedSpace, DistributionScore, PartitionsDistribution, ScoringPolicy, ScoringStrategy, SearchBudget,
    SpaceDistributionSolver,
};
pub use free_space::{FreeDiskSpace, FreeSpaceScanner, SpaceKind, SpaceOwner};
pub use guided::{GuidedProposal, Proposal};
pub use metrics::ProposalMetrics;
pub use mutator::GraphMutator;
pub use planned::{PlannedDevice, PlannedDeviceSet};
pub use settings::{ProposalSettings, VolumeSpec};
pub use space_maker::ResizeSpaceMaker;
pub use target::{SizingTarget, TargetLadder};
