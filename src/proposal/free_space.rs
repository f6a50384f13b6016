//! Free Space Scanner
//!
//! Walks the candidate disks and the volume groups living on them and
//! produces the catalogue of unallocated regions the solver distributes
//! planned devices into.

use crate::devicegraph::{
    Devicegraph, Disk, DiskRole, PartitionKind, PartitionTable, PartitionTableType,
};
use crate::domain::{DiskSize, Region};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

// =============================================================================
// Free Disk Space
// =============================================================================

/// Device an unallocated region belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum SpaceOwner {
    Disk(String),
    VolumeGroup(String),
}

impl SpaceOwner {
    pub fn name(&self) -> &str {
        match self {
            SpaceOwner::Disk(name) | SpaceOwner::VolumeGroup(name) => name,
        }
    }
}

impl fmt::Display for SpaceOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What can be created inside a free region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpaceKind {
    /// Primary partitions (or any partition on GPT)
    Primary,
    /// Logical partitions inside an extended partition
    Logical,
    /// Logical volumes inside a volume group
    Extents,
}

/// Immutable snapshot of one unallocated fragment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FreeDiskSpace {
    pub owner: SpaceOwner,
    pub region: Region,
    pub kind: SpaceKind,
    /// Minimal allocation granularity
    pub grain: DiskSize,
    /// Partition slots of `kind` still available on the owning disk
    pub slots: u32,
    /// Partition table to create first, for disks that have none
    pub new_table: Option<PartitionTableType>,
}

impl FreeDiskSpace {
    pub fn disk_name(&self) -> Option<&str> {
        match &self.owner {
            SpaceOwner::Disk(name) => Some(name),
            SpaceOwner::VolumeGroup(_) => None,
        }
    }

    /// Raw size of the region
    pub fn disk_size(&self) -> DiskSize {
        self.region.size()
    }

    /// The region shrunk to grain boundaries
    pub fn usable_region(&self) -> Region {
        self.region.aligned(self.grain)
    }

    pub fn usable_size(&self) -> DiskSize {
        self.usable_region().size()
    }

    /// Space lost per device placed here (the EBR of a logical partition)
    pub fn device_overhead(&self) -> DiskSize {
        match self.kind {
            SpaceKind::Logical => self.grain,
            _ => DiskSize::ZERO,
        }
    }

    /// Key shared by all spaces drawing from the same pool of partition slots
    pub fn slot_key(&self) -> (&str, SpaceKind) {
        (self.owner.name(), self.kind)
    }

    pub fn partition_kind(&self) -> PartitionKind {
        match self.kind {
            SpaceKind::Logical => PartitionKind::Logical,
            _ => PartitionKind::Primary,
        }
    }
}

impl fmt::Display for FreeDiskSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.owner, self.region, self.usable_size())
    }
}

// =============================================================================
// Scanner
// =============================================================================

/// Produces the free space catalogue of a device graph
#[derive(Debug, Clone, Default)]
pub struct FreeSpaceScanner {
    skip_removable: bool,
    default_table: PartitionTableType,
}

impl FreeSpaceScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip_removable(mut self, skip: bool) -> Self {
        self.skip_removable = skip;
        self
    }

    /// Table assumed (and later created) on disks without one
    pub fn default_table(mut self, table_type: PartitionTableType) -> Self {
        self.default_table = table_type;
        self
    }

    /// Collect free regions of `candidate_disks`, sorted by owner and start
    pub fn scan(&self, graph: &Devicegraph, candidate_disks: &[String]) -> Vec<FreeDiskSpace> {
        let mut spaces = Vec::new();

        for name in candidate_disks {
            let disk = match graph.disk(name) {
                Ok(disk) => disk,
                Err(_) => {
                    debug!(disk = %name, "candidate disk not present in device graph");
                    continue;
                }
            };
            if self.skip_removable && disk.is_removable() {
                debug!(disk = %name, "skipping removable disk");
                continue;
            }
            spaces.extend(self.disk_spaces(disk));
        }

        for vg in graph.volume_groups() {
            let on_candidates = !vg.physical_volumes.is_empty()
                && vg.physical_volumes.iter().all(|pv| {
                    graph
                        .disk_of(pv)
                        .is_some_and(|disk| candidate_disks.contains(&disk.name))
                });
            if !on_candidates {
                continue;
            }

            let region = vg.free_region();
            if region.is_empty() {
                continue;
            }
            spaces.push(FreeDiskSpace {
                owner: SpaceOwner::VolumeGroup(vg.name.clone()),
                region,
                kind: SpaceKind::Extents,
                grain: vg.extent_size,
                slots: u32::MAX,
                new_table: None,
            });
        }

        spaces.sort_by(|a, b| {
            (a.owner.name(), a.region.start, a.kind).cmp(&(b.owner.name(), b.region.start, b.kind))
        });

        let total: DiskSize = spaces.iter().map(|s| s.usable_size()).sum();
        info!(
            regions = spaces.len(),
            total = %total,
            "free space scan complete"
        );
        spaces
    }

    fn disk_spaces(&self, disk: &Disk) -> Vec<FreeDiskSpace> {
        let disk_region = disk.region();
        let (table, new_table) = match &disk.partition_table {
            Some(table) => (table.clone(), None),
            None => (PartitionTable::new(self.default_table), Some(self.default_table)),
        };

        table
            .unused_regions(&disk_region)
            .into_iter()
            .filter_map(|(region, kind)| {
                let kind = match kind {
                    PartitionKind::Logical => SpaceKind::Logical,
                    _ => SpaceKind::Primary,
                };
                let space = FreeDiskSpace {
                    owner: SpaceOwner::Disk(disk.name.clone()),
                    region,
                    kind,
                    grain: table.grain,
                    slots: match kind {
                        SpaceKind::Logical => table.free_logical_slots(),
                        _ => table.free_primary_slots(),
                    },
                    new_table,
                };
                if space.usable_region().is_empty() {
                    debug!(disk = %disk.name, %region, "ignoring region smaller than one grain");
                    None
                } else {
                    Some(space)
                }
            })
            .collect()
    }
}
