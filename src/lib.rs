//! Storage Proposal - Guided Partitioning Engine
//!
//! Computes how a set of requested volumes is laid out on the free space
//! of a machine's disks: which partitions, LVM physical volumes and
//! logical volumes to create, where, and how large.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                             Guided Proposal                                 │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────────┐  │
//! │  │   Space Maker   │  │   Free Space    │  │     Planned Device Set      │  │
//! │  │  (resize plan)  │  │    Scanner      │  │    (per sizing target)      │  │
//! │  └────────┬────────┘  └────────┬────────┘  └─────────────┬───────────────┘  │
//! │           │                    │                         │                  │
//! │           └────────────────────┼─────────────────────────┘                  │
//! │                                │                                            │
//! │                    ┌───────────┴───────────┐                                │
//! │                    │  Distribution Solver  │◄──── Target Retry Controller   │
//! │                    │ (bounded DFS, scored) │                                │
//! │                    └───────────┬───────────┘                                │
//! ├────────────────────────────────┼────────────────────────────────────────────┤
//! │                    ┌───────────┴───────────┐                                │
//! │                    │  Device Graph Mutator │──► Boot Validator              │
//! │                    └───────────────────────┘                                │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │                   Device Graph (disks, partition tables, LVM)               │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`proposal`]: Scanner, planner, solver, retry controller and guided proposal
//! - [`devicegraph`]: In-memory staging graph of disks and volume groups
//! - [`domain`]: Sizes, regions and the ports at the seams
//! - [`config`]: File based configuration
//! - [`error`]: Error types and handling

pub mod config;
pub mod devicegraph;
pub mod domain;
pub mod error;
pub mod proposal;

// Re-export commonly used types
pub use config::{ProposalConfig, SolverConfig};

pub use devicegraph::{
    Devicegraph, Disk, FilesystemType, Partition, PartitionId, PartitionKind, PartitionTableType, Transport,
    VolumeGroup,
};

pub use domain::{
    BootValidator, CreatedDevice, CreatedKind, DevicegraphMutator, DiskSize, Region, SpaceMaker,
};

pub use error::{Error, ErrorAction, Result};

pub use proposal::{
    FreeDiskSpace, FreeSpaceScanner, GuidedProposal, PartitionsDistribution, PlannedDeviceSet, Proposal,
    ProposalMetrics, ProposalSettings, ScoringPolicy, SearchBudget, SizingTarget, SpaceDistributionSolver,
    TargetLadder, TargetRetryController, VolumeSpec,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
