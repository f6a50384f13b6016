//! Device Graph Module
//!
//! In-memory staging model of disks, partition tables and LVM objects.
//! Every proposal attempt works on its own owned clone; mutating a clone
//! never affects the graph it was taken from.

pub mod disk;
pub mod filesystem;
pub mod graph;
pub mod lvm;
pub mod partition_table;

pub use disk::*;
pub use filesystem::*;
pub use graph::*;
pub use lvm::*;
pub use partition_table::*;

use crate::domain::DiskSize;

/// Space taken by a LUKS header on every encrypted device
pub const LUKS_OVERHEAD: DiskSize = DiskSize::mib(16);

// =============================================================================
// Block Device Capabilities
// =============================================================================

/// Operations shared by every block device that can carry a filesystem
pub trait BlkDevice {
    fn size(&self) -> DiskSize;

    fn filesystem(&self) -> Option<FilesystemType>;

    fn format(&mut self, filesystem: FilesystemType, mount_point: Option<String>);

    fn encrypt(&mut self);

    fn subvolumes_mut(&mut self) -> &mut Vec<String>;
}

impl BlkDevice for Partition {
    fn size(&self) -> DiskSize {
        self.region.size()
    }

    fn filesystem(&self) -> Option<FilesystemType> {
        self.filesystem
    }

    fn format(&mut self, filesystem: FilesystemType, mount_point: Option<String>) {
        self.filesystem = Some(filesystem);
        self.mount_point = mount_point;
        self.subvolumes.clear();
    }

    fn encrypt(&mut self) {
        self.encrypted = true;
    }

    fn subvolumes_mut(&mut self) -> &mut Vec<String> {
        &mut self.subvolumes
    }
}

impl BlkDevice for LogicalVolume {
    fn size(&self) -> DiskSize {
        self.size
    }

    fn filesystem(&self) -> Option<FilesystemType> {
        self.filesystem
    }

    fn format(&mut self, filesystem: FilesystemType, mount_point: Option<String>) {
        self.filesystem = Some(filesystem);
        self.mount_point = mount_point;
        self.subvolumes.clear();
    }

    fn encrypt(&mut self) {
        self.encrypted = true;
    }

    fn subvolumes_mut(&mut self) -> &mut Vec<String> {
        &mut self.subvolumes
    }
}

/// Read-only reference to a device found by name
#[derive(Debug, Clone, Copy)]
pub enum DeviceRef<'a> {
    Partition(&'a Disk, &'a Partition),
    LogicalVolume(&'a VolumeGroup, &'a LogicalVolume),
}

impl DeviceRef<'_> {
    pub fn size(&self) -> DiskSize {
        match self {
            DeviceRef::Partition(_, p) => p.size(),
            DeviceRef::LogicalVolume(_, lv) => lv.size,
        }
    }

    pub fn mount_point(&self) -> Option<&str> {
        match self {
            DeviceRef::Partition(_, p) => p.mount_point.as_deref(),
            DeviceRef::LogicalVolume(_, lv) => lv.mount_point.as_deref(),
        }
    }
}
