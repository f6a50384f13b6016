//! Domain Ports - Trait definitions at the seams of the proposal
//!
//! The proposal core only talks to the resize planner, the device graph
//! mutator and the bootability check through these traits. All of them
//! work on owned in-memory graphs and are synchronous.

use crate::devicegraph::{Devicegraph, FilesystemType};
use crate::domain::DiskSize;
use crate::error::Result;
use crate::proposal::distribution::PartitionsDistribution;
use crate::proposal::planned::PlannedDeviceSet;
use crate::proposal::settings::ProposalSettings;
use serde::{Deserialize, Serialize};

// =============================================================================
// Created Devices
// =============================================================================

/// Kind of device created by a mutator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreatedKind {
    PartitionTable,
    Partition,
    PhysicalVolume,
    VolumeGroup,
    LogicalVolume,
    BtrfsSubvolume,
}

impl std::fmt::Display for CreatedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CreatedKind::PartitionTable => write!(f, "partition table"),
            CreatedKind::Partition => write!(f, "partition"),
            CreatedKind::PhysicalVolume => write!(f, "physical volume"),
            CreatedKind::VolumeGroup => write!(f, "volume group"),
            CreatedKind::LogicalVolume => write!(f, "logical volume"),
            CreatedKind::BtrfsSubvolume => write!(f, "btrfs subvolume"),
        }
    }
}

/// A device that exists in the staging graph after materialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedDevice {
    /// Device name, e.g. /dev/sda2 or /dev/system/root
    pub name: String,
    pub kind: CreatedKind,
    pub size: DiskSize,
    pub mount_point: Option<String>,
    pub filesystem: Option<FilesystemType>,
}

// =============================================================================
// Space Maker Port
// =============================================================================

/// Port for making room before free space is scanned
pub trait SpaceMaker: Send + Sync {
    /// Return a copy of `graph` with space freed according to `settings`
    fn make_space(&self, graph: &Devicegraph, settings: &ProposalSettings) -> Result<Devicegraph>;
}

// =============================================================================
// Device Graph Mutator Port
// =============================================================================

/// Port committing a distribution into a staging graph
pub trait DevicegraphMutator: Send + Sync {
    /// Create the planned devices at their final sizes inside `graph`
    fn materialize(
        &self,
        graph: &mut Devicegraph,
        planned: &PlannedDeviceSet,
        distribution: &PartitionsDistribution,
        settings: &ProposalSettings,
    ) -> Result<Vec<CreatedDevice>>;
}

// =============================================================================
// Boot Validator Port
// =============================================================================

/// Port for the bootloader placement constraints
pub trait BootValidator: Send + Sync {
    /// Fail with `Error::NotBootable` when the result cannot boot
    fn validate(&self, graph: &Devicegraph, distribution: &PartitionsDistribution) -> Result<()>;
}
