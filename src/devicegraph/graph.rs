//! Device Graph
//!
//! Owned snapshot of the storage layout plus the mutation primitives used
//! when a proposal is materialized.

use super::disk::{partition_device_name, Disk};
use super::filesystem::FilesystemType;
use super::lvm::{LogicalVolume, VolumeGroup};
use super::partition_table::{
    Partition, PartitionId, PartitionKind, PartitionTable, PartitionTableType, ResizeInfo,
};
use super::{BlkDevice, DeviceRef, LUKS_OVERHEAD};
use crate::domain::{DiskSize, Region};
use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

// =============================================================================
// Serialized Form
// =============================================================================

/// On-disk representation of a graph (YAML or JSON fixtures)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GraphSnapshot {
    #[serde(default)]
    disks: Vec<Disk>,
    #[serde(default)]
    volume_groups: Vec<VolumeGroup>,
}

impl From<GraphSnapshot> for Devicegraph {
    fn from(snapshot: GraphSnapshot) -> Self {
        let mut graph = Devicegraph::new();
        for disk in snapshot.disks {
            graph.add_disk(disk);
        }
        for vg in snapshot.volume_groups {
            graph.add_volume_group(vg);
        }
        graph
    }
}

impl From<Devicegraph> for GraphSnapshot {
    fn from(graph: Devicegraph) -> Self {
        Self {
            disks: graph.disks.into_values().collect(),
            volume_groups: graph.volume_groups.into_values().collect(),
        }
    }
}

// =============================================================================
// Device Graph
// =============================================================================

/// Snapshot of disks and volume groups, keyed by name in insertion order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "GraphSnapshot", into = "GraphSnapshot")]
pub struct Devicegraph {
    disks: IndexMap<String, Disk>,
    volume_groups: IndexMap<String, VolumeGroup>,
}

impl Devicegraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a graph from YAML
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Add (or replace) a disk, naming its partitions after it
    pub fn add_disk(&mut self, mut disk: Disk) {
        if let Some(table) = disk.partition_table.as_mut() {
            for partition in table.partitions.iter_mut() {
                if partition.name.is_empty() {
                    partition.name = partition_device_name(&disk.name, partition.number);
                }
            }
        }
        self.disks.insert(disk.name.clone(), disk);
    }

    pub fn with_disk(mut self, disk: Disk) -> Self {
        self.add_disk(disk);
        self
    }

    pub fn add_volume_group(&mut self, vg: VolumeGroup) {
        self.volume_groups.insert(vg.name.clone(), vg);
    }

    pub fn disks(&self) -> impl Iterator<Item = &Disk> {
        self.disks.values()
    }

    pub fn disk(&self, name: &str) -> Result<&Disk> {
        self.disks.get(name).ok_or_else(|| Error::DeviceNotFound {
            device: name.to_string(),
        })
    }

    pub fn volume_groups(&self) -> impl Iterator<Item = &VolumeGroup> {
        self.volume_groups.values()
    }

    pub fn volume_group(&self, name: &str) -> Result<&VolumeGroup> {
        self.volume_groups.get(name).ok_or_else(|| Error::DeviceNotFound {
            device: name.to_string(),
        })
    }

    /// All partitions together with their disk
    pub fn partitions(&self) -> impl Iterator<Item = (&Disk, &Partition)> {
        self.disks.values().flat_map(|disk| {
            disk.partition_table
                .iter()
                .flat_map(move |table| table.partitions.iter().map(move |p| (disk, p)))
        })
    }

    /// Disk holding the named partition
    pub fn disk_of(&self, device: &str) -> Option<&Disk> {
        self.partitions()
            .find(|(_, p)| p.name == device)
            .map(|(disk, _)| disk)
    }

    /// Look up a partition or logical volume by device name
    pub fn find_device(&self, device: &str) -> Option<DeviceRef<'_>> {
        if let Some((disk, partition)) = self.partitions().find(|(_, p)| p.name == device) {
            return Some(DeviceRef::Partition(disk, partition));
        }
        self.volume_groups.values().find_map(|vg| {
            vg.logical_volumes
                .iter()
                .find(|lv| vg.lv_device_name(&lv.name) == device)
                .map(|lv| DeviceRef::LogicalVolume(vg, lv))
        })
    }

    fn blk_device_mut(&mut self, device: &str) -> Result<&mut dyn BlkDevice> {
        let partition = self
            .disks
            .values_mut()
            .filter_map(|disk| disk.partition_table.as_mut())
            .flat_map(|table| table.partitions.iter_mut())
            .find(|p| p.name == device);
        if let Some(partition) = partition {
            let blk: &mut dyn BlkDevice = partition;
            return Ok(blk);
        }

        let lv = self.volume_groups.values_mut().find_map(|vg| {
            let prefix = format!("/dev/{}/", vg.name);
            vg.logical_volumes
                .iter_mut()
                .find(|lv| device.strip_prefix(prefix.as_str()) == Some(lv.name.as_str()))
        });
        match lv {
            Some(lv) => {
                let blk: &mut dyn BlkDevice = lv;
                Ok(blk)
            }
            None => Err(Error::DeviceNotFound {
                device: device.to_string(),
            }),
        }
    }

    fn partition_mut(&mut self, device: &str) -> Result<&mut Partition> {
        self.disks
            .values_mut()
            .filter_map(|disk| disk.partition_table.as_mut())
            .flat_map(|table| table.partitions.iter_mut())
            .find(|p| p.name == device)
            .ok_or_else(|| Error::DeviceNotFound {
                device: device.to_string(),
            })
    }

    // =========================================================================
    // Partition Primitives
    // =========================================================================

    /// Create an empty partition table, replacing an unused one
    pub fn create_partition_table(&mut self, disk: &str, table_type: PartitionTableType) -> Result<()> {
        let disk = self.disks.get_mut(disk).ok_or_else(|| Error::DeviceNotFound {
            device: disk.to_string(),
        })?;
        if disk
            .partition_table
            .as_ref()
            .is_some_and(|t| !t.partitions.is_empty())
        {
            return Err(Error::DeviceGraph(format!(
                "{} already holds partitions",
                disk.name
            )));
        }
        debug!(disk = %disk.name, ?table_type, "creating partition table");
        disk.partition_table = Some(PartitionTable::new(table_type));
        Ok(())
    }

    /// Create a partition covering `region` and return its device name
    pub fn create_partition(
        &mut self,
        disk_name: &str,
        region: Region,
        kind: PartitionKind,
        id: PartitionId,
    ) -> Result<String> {
        let disk = self.disks.get_mut(disk_name).ok_or_else(|| Error::DeviceNotFound {
            device: disk_name.to_string(),
        })?;
        let disk_region = disk.region();
        let disk_device = disk.name.clone();
        let table = disk
            .partition_table
            .as_mut()
            .ok_or_else(|| Error::DeviceGraph(format!("{} has no partition table", disk_name)))?;

        if region.is_empty() {
            return Err(Error::DeviceGraph("cannot create an empty partition".into()));
        }
        if kind == PartitionKind::Extended
            && (table.table_type != PartitionTableType::Msdos || table.extended().is_some())
        {
            return Err(Error::DeviceGraph(format!(
                "{} cannot hold another extended partition",
                disk_name
            )));
        }

        let container = table.container_region(&disk_region, kind).ok_or_else(|| {
            Error::DeviceGraph(format!("{} has no extended partition", disk_name))
        })?;
        if !container.contains(&region) {
            return Err(Error::DeviceGraph(format!(
                "region {} is outside the usable space of {}",
                region, disk_name
            )));
        }

        let logical = kind == PartitionKind::Logical;
        if table
            .partitions
            .iter()
            .filter(|p| (p.kind == PartitionKind::Logical) == logical)
            .any(|p| p.region.overlaps(&region))
        {
            return Err(Error::DeviceGraph(format!(
                "region {} overlaps an existing partition on {}",
                region, disk_name
            )));
        }

        let number = table.next_number(kind).ok_or_else(|| {
            Error::DeviceGraph(format!("no free partition slot on {}", disk_name))
        })?;
        let name = partition_device_name(&disk_device, number);
        debug!(partition = %name, %region, ?kind, ?id, "creating partition");
        table
            .partitions
            .push(Partition::new(name.clone(), number, region, kind, id));
        table.partitions.sort_by_key(|p| p.number);
        Ok(name)
    }

    pub fn remove_partition(&mut self, device: &str) -> Result<()> {
        for disk in self.disks.values_mut() {
            if let Some(table) = disk.partition_table.as_mut() {
                if let Some(pos) = table.partitions.iter().position(|p| p.name == device) {
                    table.partitions.remove(pos);
                    return Ok(());
                }
            }
        }
        Err(Error::DeviceNotFound {
            device: device.to_string(),
        })
    }

    pub fn set_partition_id(&mut self, device: &str, id: PartitionId) -> Result<()> {
        self.partition_mut(device)?.id = id;
        Ok(())
    }

    // =========================================================================
    // Resizing
    // =========================================================================

    /// Resize limits of a partition or logical volume
    pub fn resize_info(&self, device: &str) -> Result<ResizeInfo> {
        match self.find_device(device) {
            Some(DeviceRef::Partition(_, partition)) => Ok(partition
                .resize_info
                .unwrap_or_else(|| ResizeInfo::fixed(partition.size()))),
            Some(DeviceRef::LogicalVolume(vg, lv)) => Ok(ResizeInfo {
                resize_ok: true,
                min_size: vg.extent_size,
                max_size: lv.size + DiskSize::b(vg.free_extents() * vg.extent_size.to_bytes()),
            }),
            None => Err(Error::DeviceNotFound {
                device: device.to_string(),
            }),
        }
    }

    /// Resize a partition (moving its end) or a logical volume
    pub fn resize(&mut self, device: &str, new_size: DiskSize) -> Result<()> {
        let info = self.resize_info(device)?;
        if !info.resize_ok {
            return Err(Error::DeviceGraph(format!("{} cannot be resized", device)));
        }
        if new_size < info.min_size || new_size > info.max_size {
            return Err(Error::DeviceGraph(format!(
                "{} must stay between {} and {}",
                device, info.min_size, info.max_size
            )));
        }

        let lv_target = match self.find_device(device) {
            Some(DeviceRef::LogicalVolume(vg, lv)) => Some((vg.name.clone(), lv.name.clone())),
            _ => None,
        };
        if let Some((vg_name, lv_name)) = lv_target {
            let vg = self
                .volume_groups
                .get_mut(&vg_name)
                .ok_or_else(|| Error::DeviceNotFound { device: vg_name.clone() })?;
            let extent = vg.extent_size;
            if let Some(lv) = vg.logical_volumes.iter_mut().find(|lv| lv.name == lv_name) {
                debug!(device, %new_size, "resizing logical volume");
                lv.size = new_size.align_up(extent);
            }
            return Ok(());
        }

        let disk = self
            .disk_of(device)
            .ok_or_else(|| Error::DeviceNotFound {
                device: device.to_string(),
            })?;
        let disk_region = disk.region();
        let disk_name = disk.name.clone();
        let table = disk
            .partition_table
            .as_ref()
            .ok_or_else(|| Error::DeviceGraph(format!("{} has no partition table", disk_name)))?;
        let partition = table
            .partitions
            .iter()
            .find(|p| p.name == device)
            .ok_or_else(|| Error::DeviceNotFound {
                device: device.to_string(),
            })?;

        let mut region = partition.region;
        region.length = region.blocks_for(new_size);
        let logical = partition.kind == PartitionKind::Logical;
        let container = table
            .container_region(&disk_region, partition.kind)
            .unwrap_or(disk_region);
        let blocked = table
            .partitions
            .iter()
            .filter(|p| p.name != device && (p.kind == PartitionKind::Logical) == logical)
            .any(|p| p.region.overlaps(&region));
        if blocked || !container.contains(&region) {
            return Err(Error::DeviceGraph(format!(
                "no room to resize {} to {}",
                device, new_size
            )));
        }

        debug!(device, %new_size, "resizing partition");
        self.partition_mut(device)?.region = region;
        Ok(())
    }

    // =========================================================================
    // Filesystems
    // =========================================================================

    pub fn set_filesystem(
        &mut self,
        device: &str,
        filesystem: FilesystemType,
        mount_point: Option<String>,
    ) -> Result<()> {
        self.blk_device_mut(device)?.format(filesystem, mount_point);
        Ok(())
    }

    pub fn set_encryption(&mut self, device: &str) -> Result<()> {
        self.blk_device_mut(device)?.encrypt();
        Ok(())
    }

    pub fn create_btrfs_subvolume(&mut self, parent: &str, path: &str) -> Result<()> {
        let blk = self.blk_device_mut(parent)?;
        if blk.filesystem() != Some(FilesystemType::Btrfs) {
            return Err(Error::DeviceGraph(format!(
                "{} does not hold a btrfs filesystem",
                parent
            )));
        }
        let subvolumes = blk.subvolumes_mut();
        if !subvolumes.iter().any(|s| s == path) {
            subvolumes.push(path.to_string());
        }
        Ok(())
    }

    // =========================================================================
    // LVM
    // =========================================================================

    /// Create a volume group on top of existing partitions
    pub fn create_lvm_vg(&mut self, name: &str, pvs: &[String], extent_size: DiskSize) -> Result<()> {
        if self.volume_groups.contains_key(name) {
            return Err(Error::DeviceGraph(format!("volume group {} already exists", name)));
        }
        if extent_size.is_zero() {
            return Err(Error::DeviceGraph("extent size must not be zero".into()));
        }

        let mut extents = 0;
        for pv in pvs {
            // the LUKS header sits in front of the LVM metadata
            let size = match self.find_device(pv) {
                Some(DeviceRef::Partition(_, partition)) if partition.encrypted => {
                    partition.size() - LUKS_OVERHEAD
                }
                Some(DeviceRef::Partition(_, partition)) => partition.size(),
                _ => {
                    return Err(Error::DeviceNotFound {
                        device: pv.to_string(),
                    })
                }
            };
            extents += VolumeGroup::extents_for_pv(size, extent_size);
            self.set_partition_id(pv, PartitionId::Lvm)?;
        }

        debug!(vg = name, extents, "creating volume group");
        self.add_volume_group(VolumeGroup {
            name: name.to_string(),
            extent_size,
            extents,
            physical_volumes: pvs.to_vec(),
            logical_volumes: Vec::new(),
        });
        Ok(())
    }

    /// Create a logical volume and return its device name
    pub fn create_lvm_lv(&mut self, vg_name: &str, name: &str, size: DiskSize) -> Result<String> {
        let vg = self
            .volume_groups
            .get_mut(vg_name)
            .ok_or_else(|| Error::DeviceNotFound {
                device: vg_name.to_string(),
            })?;
        if vg.find_lv(name).is_some() {
            return Err(Error::DeviceGraph(format!(
                "logical volume {} already exists in {}",
                name, vg_name
            )));
        }

        let size = size.align_up(vg.extent_size);
        let needed = size.to_bytes() / vg.extent_size.to_bytes().max(1);
        if size.is_zero() || needed > vg.free_extents() {
            return Err(Error::DeviceGraph(format!(
                "{} does not have {} free for {}",
                vg_name, size, name
            )));
        }

        debug!(vg = vg_name, lv = name, %size, "creating logical volume");
        vg.logical_volumes.push(LogicalVolume::new(name, size));
        Ok(vg.lv_device_name(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB_BLOCKS: u64 = 2048;

    fn gpt_graph() -> Devicegraph {
        Devicegraph::new()
            .with_disk(Disk::new("/dev/sda", DiskSize::gib(10)).with_partition_table(PartitionTableType::Gpt))
    }

    fn mib_region(start: u64, size: u64) -> Region {
        Region::new(start * MIB_BLOCKS, size * MIB_BLOCKS, 512)
    }

    #[test]
    fn test_create_partition() {
        let mut graph = gpt_graph();
        let name = graph
            .create_partition("/dev/sda", mib_region(1, 100), PartitionKind::Primary, PartitionId::Linux)
            .unwrap();
        assert_eq!(name, "/dev/sda1");

        let second = graph
            .create_partition("/dev/sda", mib_region(101, 100), PartitionKind::Primary, PartitionId::Swap)
            .unwrap();
        assert_eq!(second, "/dev/sda2");
        assert_eq!(graph.partitions().count(), 2);
    }

    #[test]
    fn test_create_overlapping_partition_fails() {
        let mut graph = gpt_graph();
        graph
            .create_partition("/dev/sda", mib_region(1, 100), PartitionKind::Primary, PartitionId::Linux)
            .unwrap();
        let err = graph
            .create_partition("/dev/sda", mib_region(50, 100), PartitionKind::Primary, PartitionId::Linux)
            .unwrap_err();
        assert!(matches!(err, Error::DeviceGraph(_)));
    }

    #[test]
    fn test_create_partition_outside_disk_fails() {
        let mut graph = gpt_graph();
        let err = graph
            .create_partition("/dev/sda", mib_region(0, 100), PartitionKind::Primary, PartitionId::Linux)
            .unwrap_err();
        assert!(matches!(err, Error::DeviceGraph(_)));
    }

    #[test]
    fn test_clone_is_independent() {
        let original = gpt_graph();
        let mut staging = original.clone();
        staging
            .create_partition("/dev/sda", mib_region(1, 100), PartitionKind::Primary, PartitionId::Linux)
            .unwrap();
        assert_eq!(original.partitions().count(), 0);
        assert_eq!(staging.partitions().count(), 1);
    }

    #[test]
    fn test_resize_partition() {
        let mut graph = gpt_graph();
        let name = graph
            .create_partition("/dev/sda", mib_region(1, 4096), PartitionKind::Primary, PartitionId::Windows)
            .unwrap();
        graph.partition_mut(&name).unwrap().resize_info = Some(ResizeInfo {
            resize_ok: true,
            min_size: DiskSize::gib(1),
            max_size: DiskSize::gib(6),
        });

        graph.resize(&name, DiskSize::gib(2)).unwrap();
        assert_eq!(graph.find_device(&name).unwrap().size(), DiskSize::gib(2));

        let err = graph.resize(&name, DiskSize::mib(512)).unwrap_err();
        assert!(matches!(err, Error::DeviceGraph(_)));
    }

    #[test]
    fn test_fixed_partition_cannot_resize() {
        let mut graph = gpt_graph();
        let name = graph
            .create_partition("/dev/sda", mib_region(1, 100), PartitionKind::Primary, PartitionId::Linux)
            .unwrap();
        assert!(graph.resize(&name, DiskSize::mib(50)).is_err());
    }

    #[test]
    fn test_lvm_primitives() {
        let mut graph = gpt_graph();
        let pv = graph
            .create_partition("/dev/sda", mib_region(1, 8193), PartitionKind::Primary, PartitionId::Linux)
            .unwrap();
        graph
            .create_lvm_vg("system", &[pv.clone()], DiskSize::mib(4))
            .unwrap();
        assert_eq!(graph.volume_group("system").unwrap().extents, 2048);

        let lv = graph.create_lvm_lv("system", "root", DiskSize::gib(6)).unwrap();
        assert_eq!(lv, "/dev/system/root");
        assert!(graph.create_lvm_lv("system", "home", DiskSize::gib(4)).is_err());

        graph.set_filesystem(&lv, FilesystemType::Btrfs, Some("/".into())).unwrap();
        graph.create_btrfs_subvolume(&lv, "@/home").unwrap();
        match graph.find_device(&lv) {
            Some(DeviceRef::LogicalVolume(_, lv)) => assert_eq!(lv.subvolumes, vec!["@/home"]),
            other => panic!("unexpected device {:?}", other),
        }

        match graph.find_device(&pv) {
            Some(DeviceRef::Partition(_, p)) => assert_eq!(p.id, PartitionId::Lvm),
            other => panic!("unexpected device {:?}", other),
        }
    }

    #[test]
    fn test_encrypted_pv_loses_luks_header() {
        let mut graph = gpt_graph();
        let pv = graph
            .create_partition("/dev/sda", mib_region(1, 8193), PartitionKind::Primary, PartitionId::Linux)
            .unwrap();
        graph.set_encryption(&pv).unwrap();
        graph
            .create_lvm_vg("system", &[pv], DiskSize::mib(4))
            .unwrap();
        // (8193 - 16 - 1) MiB in 4 MiB extents
        assert_eq!(graph.volume_group("system").unwrap().extents, 2044);
    }

    #[test]
    fn test_subvolume_requires_btrfs() {
        let mut graph = gpt_graph();
        let name = graph
            .create_partition("/dev/sda", mib_region(1, 100), PartitionKind::Primary, PartitionId::Linux)
            .unwrap();
        graph.set_filesystem(&name, FilesystemType::Ext4, None).unwrap();
        assert!(graph.create_btrfs_subvolume(&name, "@/var").is_err());
    }

    #[test]
    fn test_yaml_round_trip_names_partitions() {
        let yaml = r#"
disks:
  - name: /dev/nvme0n1
    size: 20 GiB
    transport: nvme
    partition_table:
      type: gpt
      partitions:
        - number: 1
          region: { start: 2048, length: 1048576, block_size: 512 }
          id: esp
          filesystem: vfat
          mount_point: /boot/efi
"#;
        let graph = Devicegraph::from_yaml(yaml).unwrap();
        let disk = graph.disk("/dev/nvme0n1").unwrap();
        assert_eq!(disk.block_size, 512);
        assert!(graph.find_device("/dev/nvme0n1p1").is_some());
    }
}
