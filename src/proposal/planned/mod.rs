//! Planned Devices
//!
//! In-memory descriptions of the devices a proposal is going to create.
//! Every variant exposes the same sizing interface; the variant decides
//! which kind of free space it consumes and how it is materialized.

pub mod planner;

pub use planner::*;

use super::free_space::{FreeDiskSpace, SpaceOwner};
use crate::devicegraph::{Devicegraph, FilesystemType, PartitionId, PartitionKind};
use crate::domain::{DiskSize, Region};
use crate::error::{Error, Result};
use serde::Serialize;
use tracing::debug;

// =============================================================================
// Shared Sizing
// =============================================================================

/// Sizing data common to every planned device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedVolume {
    /// Unique id inside one planned device set
    pub id: String,
    pub min_size: DiskSize,
    /// `DiskSize::UNLIMITED` when unbounded
    pub max_size: DiskSize,
    /// Share of surplus space the device grows into
    pub weight: u32,
    /// Disk the device must be placed on
    pub disk: Option<String>,
    pub optional: bool,
}

impl PlannedVolume {
    pub fn new(id: impl Into<String>, min_size: DiskSize, max_size: DiskSize, weight: u32) -> Self {
        Self {
            id: id.into(),
            min_size,
            max_size: max_size.max(min_size),
            weight,
            disk: None,
            optional: false,
        }
    }
}

// =============================================================================
// Variants
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedPartition {
    pub volume: PlannedVolume,
    pub filesystem: FilesystemType,
    pub mount_point: String,
    pub partition_id: PartitionId,
    pub encrypt: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedLogicalVolume {
    pub volume: PlannedVolume,
    pub vg_name: String,
    pub lv_name: String,
    pub filesystem: FilesystemType,
    pub mount_point: String,
    pub encrypt: bool,
    /// Placed into free extents of an existing volume group
    pub reuse: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedVolumeGroup {
    pub volume: PlannedVolume,
    pub vg_name: String,
    pub extent_size: DiskSize,
    /// Ids of the logical volumes it will hold
    pub lvs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedPhysicalVolume {
    pub volume: PlannedVolume,
    pub vg_name: String,
    pub encrypt: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedSubvolume {
    pub volume: PlannedVolume,
    /// Mount point of the btrfs volume holding the subvolume
    pub parent_mount: String,
    pub path: String,
}

/// Kind of space a device consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceDemand<'a> {
    /// A partition on a disk
    Partition,
    /// Extents of the named existing volume group
    Extents(&'a str),
}

/// Where a planned device gets materialized
#[derive(Debug, Clone, Copy)]
pub enum Placement<'a> {
    Region {
        disk: &'a str,
        region: Region,
        kind: PartitionKind,
    },
    VolumeGroup {
        vg: &'a str,
        size: DiskSize,
    },
    PhysicalVolumes(&'a [String]),
    Parent(&'a str),
}

/// A volume to be created, not yet materialized
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlannedDevice {
    Partition(PlannedPartition),
    LogicalVolume(PlannedLogicalVolume),
    VolumeGroup(PlannedVolumeGroup),
    PhysicalVolume(PlannedPhysicalVolume),
    BtrfsSubvolume(PlannedSubvolume),
}

impl PlannedDevice {
    pub fn volume(&self) -> &PlannedVolume {
        match self {
            PlannedDevice::Partition(d) => &d.volume,
            PlannedDevice::LogicalVolume(d) => &d.volume,
            PlannedDevice::VolumeGroup(d) => &d.volume,
            PlannedDevice::PhysicalVolume(d) => &d.volume,
            PlannedDevice::BtrfsSubvolume(d) => &d.volume,
        }
    }

    pub fn id(&self) -> &str {
        &self.volume().id
    }

    pub fn min_size(&self) -> DiskSize {
        self.volume().min_size
    }

    pub fn max_size(&self) -> DiskSize {
        self.volume().max_size
    }

    pub fn weight(&self) -> u32 {
        self.volume().weight
    }

    pub fn disk_restriction(&self) -> Option<&str> {
        self.volume().disk.as_deref()
    }

    pub fn is_optional(&self) -> bool {
        self.volume().optional
    }

    pub fn mount_point(&self) -> Option<&str> {
        match self {
            PlannedDevice::Partition(d) => Some(&d.mount_point),
            PlannedDevice::LogicalVolume(d) => Some(&d.mount_point),
            _ => None,
        }
    }

    /// Kind of free space this device is placed into by the solver, if any
    pub fn space_demand(&self) -> Option<SpaceDemand<'_>> {
        match self {
            PlannedDevice::Partition(_) | PlannedDevice::PhysicalVolume(_) => {
                Some(SpaceDemand::Partition)
            }
            PlannedDevice::LogicalVolume(lv) if lv.reuse => Some(SpaceDemand::Extents(&lv.vg_name)),
            _ => None,
        }
    }

    /// Whether the device may be placed into `space`
    pub fn accepts(&self, space: &FreeDiskSpace) -> bool {
        match (self.space_demand(), &space.owner) {
            (Some(SpaceDemand::Partition), SpaceOwner::Disk(disk)) => {
                self.disk_restriction().map_or(true, |d| d == disk)
            }
            (Some(SpaceDemand::Extents(vg)), SpaceOwner::VolumeGroup(name)) => vg == name,
            _ => false,
        }
    }

    /// Create the device in `graph`, returning the new device name
    pub fn materialize(&self, graph: &mut Devicegraph, placement: Placement<'_>) -> Result<String> {
        debug!(device = self.id(), ?placement, "materializing planned device");
        match (self, placement) {
            (PlannedDevice::Partition(p), Placement::Region { disk, region, kind }) => {
                let name = graph.create_partition(disk, region, kind, p.partition_id)?;
                if p.encrypt {
                    graph.set_encryption(&name)?;
                }
                graph.set_filesystem(&name, p.filesystem, Some(p.mount_point.clone()))?;
                Ok(name)
            }
            (PlannedDevice::PhysicalVolume(pv), Placement::Region { disk, region, kind }) => {
                let name = graph.create_partition(disk, region, kind, PartitionId::Lvm)?;
                if pv.encrypt {
                    graph.set_encryption(&name)?;
                }
                Ok(name)
            }
            (PlannedDevice::LogicalVolume(lv), Placement::VolumeGroup { vg, size }) => {
                let name = graph.create_lvm_lv(vg, &lv.lv_name, size)?;
                if lv.encrypt {
                    graph.set_encryption(&name)?;
                }
                graph.set_filesystem(&name, lv.filesystem, Some(lv.mount_point.clone()))?;
                Ok(name)
            }
            (PlannedDevice::VolumeGroup(vg), Placement::PhysicalVolumes(pvs)) => {
                graph.create_lvm_vg(&vg.vg_name, pvs, vg.extent_size)?;
                Ok(format!("/dev/{}", vg.vg_name))
            }
            (PlannedDevice::BtrfsSubvolume(sv), Placement::Parent(parent)) => {
                graph.create_btrfs_subvolume(parent, &sv.path)?;
                Ok(format!("{}[{}]", parent, sv.path))
            }
            (device, placement) => Err(Error::Proposal(format!(
                "{} cannot be placed at {:?}",
                device.id(),
                placement
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devicegraph::{Disk, PartitionTableType};
    use crate::proposal::free_space::SpaceKind;

    fn partition(id: &str, disk: Option<&str>) -> PlannedDevice {
        let mut volume = PlannedVolume::new(id, DiskSize::gib(1), DiskSize::gib(2), 1);
        volume.disk = disk.map(|d| d.to_string());
        PlannedDevice::Partition(PlannedPartition {
            volume,
            filesystem: FilesystemType::Xfs,
            mount_point: id.to_string(),
            partition_id: PartitionId::Linux,
            encrypt: false,
        })
    }

    fn space(owner: SpaceOwner) -> FreeDiskSpace {
        FreeDiskSpace {
            owner,
            region: Region::new(2048, 2048 * 1024, 512),
            kind: SpaceKind::Primary,
            grain: DiskSize::mib(1),
            slots: 128,
            new_table: None,
        }
    }

    #[test]
    fn test_max_never_below_min() {
        let volume = PlannedVolume::new("/", DiskSize::gib(4), DiskSize::gib(2), 0);
        assert_eq!(volume.max_size, DiskSize::gib(4));
    }

    #[test]
    fn test_accepts_respects_restriction() {
        let sda = space(SpaceOwner::Disk("/dev/sda".into()));
        let sdb = space(SpaceOwner::Disk("/dev/sdb".into()));
        let vg = space(SpaceOwner::VolumeGroup("system".into()));

        let free = partition("/srv", None);
        assert!(free.accepts(&sda));
        assert!(free.accepts(&sdb));
        assert!(!free.accepts(&vg));

        let pinned = partition("/srv", Some("/dev/sdb"));
        assert!(!pinned.accepts(&sda));
        assert!(pinned.accepts(&sdb));
    }

    #[test]
    fn test_subvolumes_demand_no_space() {
        let subvolume = PlannedDevice::BtrfsSubvolume(PlannedSubvolume {
            volume: PlannedVolume::new("/@/home", DiskSize::ZERO, DiskSize::ZERO, 0),
            parent_mount: "/".into(),
            path: "@/home".into(),
        });
        assert!(subvolume.space_demand().is_none());
    }

    #[test]
    fn test_materialize_partition() {
        let mut graph = Devicegraph::new()
            .with_disk(Disk::new("/dev/sda", DiskSize::gib(4)).with_partition_table(PartitionTableType::Gpt));
        let device = partition("/srv", None);
        let name = device
            .materialize(
                &mut graph,
                Placement::Region {
                    disk: "/dev/sda",
                    region: Region::new(2048, 2048 * 1024, 512),
                    kind: PartitionKind::Primary,
                },
            )
            .unwrap();
        assert_eq!(name, "/dev/sda1");
        assert_eq!(graph.find_device(&name).unwrap().mount_point(), Some("/srv"));
    }

    #[test]
    fn test_materialize_rejects_wrong_placement() {
        let mut graph = Devicegraph::new();
        let device = partition("/srv", None);
        let err = device
            .materialize(&mut graph, Placement::Parent("/dev/sda1"))
            .unwrap_err();
        assert!(matches!(err, Error::Proposal(_)));
    }
}
