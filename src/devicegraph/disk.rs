//! Disks
//!
//! Whole-disk block devices, their transport and optional partition table.

use super::partition_table::{PartitionTable, PartitionTableType};
use crate::domain::{DiskSize, Region};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

fn default_block_size() -> u64 {
    512
}

// =============================================================================
// Transport
// =============================================================================

/// Bus or protocol a disk is attached through
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Sata,
    Nvme,
    Usb,
    Network,
    Multipath,
    #[default]
    Unknown,
}

// =============================================================================
// Disk Role
// =============================================================================

/// Role queries answered per concrete disk type
pub trait DiskRole {
    fn transport(&self) -> Transport;

    fn is_usb(&self) -> bool {
        self.transport() == Transport::Usb
    }

    /// iSCSI, FCoE and similar
    fn is_network(&self) -> bool {
        self.transport() == Transport::Network
    }

    fn is_multipath(&self) -> bool {
        self.transport() == Transport::Multipath
    }

    fn is_removable(&self) -> bool {
        self.is_usb()
    }
}

// =============================================================================
// Disk
// =============================================================================

/// A physical (or virtual) disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Disk {
    /// Kernel device name, e.g. /dev/sda
    pub name: String,
    /// Total size
    pub size: DiskSize,
    /// Logical block size in bytes
    #[serde(default = "default_block_size")]
    pub block_size: u64,
    #[serde(default)]
    pub transport: Transport,
    #[serde(default)]
    pub partition_table: Option<PartitionTable>,
}

impl Disk {
    pub fn new(name: impl Into<String>, size: DiskSize) -> Self {
        Self {
            name: name.into(),
            size,
            block_size: default_block_size(),
            transport: Transport::Unknown,
            partition_table: None,
        }
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_partition_table(mut self, table_type: PartitionTableType) -> Self {
        self.partition_table = Some(PartitionTable::new(table_type));
        self
    }

    /// Region covering the whole disk
    pub fn region(&self) -> Region {
        Region::new(0, self.size.to_bytes() / self.block_size, self.block_size)
    }

    /// Name of partition `number` on this disk (nvme0n1 -> nvme0n1p1, sda -> sda1)
    pub fn partition_name(&self, number: u32) -> String {
        partition_device_name(&self.name, number)
    }
}

/// Device name of partition `number` of `disk`
pub fn partition_device_name(disk: &str, number: u32) -> String {
    if disk.ends_with(|c: char| c.is_ascii_digit()) {
        format!("{}p{}", disk, number)
    } else {
        format!("{}{}", disk, number)
    }
}

impl DiskRole for Disk {
    fn transport(&self) -> Transport {
        self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_names() {
        let sda = Disk::new("/dev/sda", DiskSize::gib(10));
        assert_eq!(sda.partition_name(2), "/dev/sda2");

        let nvme = Disk::new("/dev/nvme0n1", DiskSize::gib(10));
        assert_eq!(nvme.partition_name(1), "/dev/nvme0n1p1");
    }

    #[test]
    fn test_disk_roles() {
        let usb = Disk::new("/dev/sdb", DiskSize::gib(16)).with_transport(Transport::Usb);
        assert!(usb.is_usb());
        assert!(usb.is_removable());
        assert!(!usb.is_network());

        let san = Disk::new("/dev/sdc", DiskSize::gib(16)).with_transport(Transport::Network);
        assert!(san.is_network());
        assert!(!san.is_removable());
    }

    #[test]
    fn test_disk_region() {
        let disk = Disk::new("/dev/sda", DiskSize::gib(1));
        assert_eq!(disk.region().length, 2 * 1024 * 1024);
        assert_eq!(disk.region().size(), DiskSize::gib(1));
    }
}
