//! LVM
//!
//! Volume groups and logical volumes. Space inside a volume group is
//! accounted in extents.

use super::filesystem::FilesystemType;
use crate::domain::{DiskSize, Region};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default extent size of new volume groups: 4 MiB
pub const DEFAULT_EXTENT_SIZE: DiskSize = DiskSize::mib(4);

/// Space reserved on every physical volume for LVM metadata
pub const PV_METADATA_SIZE: DiskSize = DiskSize::mib(1);

fn default_extent_size() -> DiskSize {
    DEFAULT_EXTENT_SIZE
}

/// A logical volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LogicalVolume {
    pub name: String,
    pub size: DiskSize,
    #[serde(default)]
    pub filesystem: Option<FilesystemType>,
    #[serde(default)]
    pub mount_point: Option<String>,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    pub subvolumes: Vec<String>,
}

impl LogicalVolume {
    pub fn new(name: impl Into<String>, size: DiskSize) -> Self {
        Self {
            name: name.into(),
            size,
            filesystem: None,
            mount_point: None,
            encrypted: false,
            subvolumes: Vec::new(),
        }
    }
}

/// A volume group spanning one or more physical volumes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VolumeGroup {
    pub name: String,
    #[serde(default = "default_extent_size")]
    pub extent_size: DiskSize,
    /// Total number of extents provided by the physical volumes
    pub extents: u64,
    /// Device names of the physical volumes
    #[serde(default)]
    pub physical_volumes: Vec<String>,
    #[serde(default)]
    pub logical_volumes: Vec<LogicalVolume>,
}

impl VolumeGroup {
    /// Number of extents a physical volume of `pv_size` contributes
    pub fn extents_for_pv(pv_size: DiskSize, extent_size: DiskSize) -> u64 {
        if extent_size.is_zero() {
            return 0;
        }
        (pv_size - PV_METADATA_SIZE).to_bytes() / extent_size.to_bytes()
    }

    /// Device name of logical volume `lv`
    pub fn lv_device_name(&self, lv: &str) -> String {
        format!("/dev/{}/{}", self.name, lv)
    }

    pub fn size(&self) -> DiskSize {
        DiskSize::b(self.extents.saturating_mul(self.extent_size.to_bytes()))
    }

    pub fn used_extents(&self) -> u64 {
        self.logical_volumes
            .iter()
            .map(|lv| lv.size.to_bytes().div_ceil(self.extent_size.to_bytes().max(1)))
            .sum()
    }

    pub fn free_extents(&self) -> u64 {
        self.extents.saturating_sub(self.used_extents())
    }

    /// Unused extents expressed as a region whose blocks are extents
    pub fn free_region(&self) -> Region {
        Region::new(
            self.used_extents(),
            self.free_extents(),
            self.extent_size.to_bytes(),
        )
    }

    pub fn find_lv(&self, name: &str) -> Option<&LogicalVolume> {
        self.logical_volumes.iter().find(|lv| lv.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_accounting() {
        let mut vg = VolumeGroup {
            name: "system".into(),
            extent_size: DEFAULT_EXTENT_SIZE,
            extents: VolumeGroup::extents_for_pv(DiskSize::gib(10), DEFAULT_EXTENT_SIZE),
            physical_volumes: vec!["/dev/sda2".into()],
            logical_volumes: Vec::new(),
        };
        assert_eq!(vg.extents, 2559);

        vg.logical_volumes.push(LogicalVolume::new("root", DiskSize::mib(4097)));
        assert_eq!(vg.used_extents(), 1025);
        assert_eq!(vg.free_extents(), 1534);
        assert_eq!(vg.free_region().size(), DiskSize::mib(1534 * 4));
        assert_eq!(vg.lv_device_name("root"), "/dev/system/root");
    }
}
