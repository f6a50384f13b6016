//! Space Maker
//!
//! Resize planning that runs before the free space scan: devices the
//! settings allow to be resized are shrunk to their minimum on a staging
//! copy, and the scanner later sees the freed space as ordinary free space.

use crate::devicegraph::{DeviceRef, Devicegraph, DEFAULT_GRAIN};
use crate::domain::{DiskSize, SpaceMaker};
use crate::error::Result;
use crate::proposal::settings::ProposalSettings;
use tracing::{debug, info, warn};

/// Shrinks every resizable device listed in `resize_allowed`
#[derive(Debug, Clone, Copy, Default)]
pub struct ResizeSpaceMaker;

impl ResizeSpaceMaker {
    pub fn new() -> Self {
        Self
    }

    /// Current size and allocation grain of `device`, if it lives on a candidate disk
    fn locate(graph: &Devicegraph, device: &str, settings: &ProposalSettings) -> Option<(DiskSize, DiskSize)> {
        match graph.find_device(device)? {
            DeviceRef::Partition(disk, partition) => {
                if !settings.candidate_disks.contains(&disk.name) {
                    debug!(device, disk = %disk.name, "not on a candidate disk, not resizing");
                    return None;
                }
                let grain = disk
                    .partition_table
                    .as_ref()
                    .map(|t| t.grain)
                    .unwrap_or(DEFAULT_GRAIN);
                Some((partition.size(), grain))
            }
            DeviceRef::LogicalVolume(vg, lv) => Some((lv.size, vg.extent_size)),
        }
    }
}

impl SpaceMaker for ResizeSpaceMaker {
    fn make_space(&self, graph: &Devicegraph, settings: &ProposalSettings) -> Result<Devicegraph> {
        let mut staging = graph.clone();

        for device in &settings.resize_allowed {
            let Some((current, grain)) = Self::locate(&staging, device, settings) else {
                warn!(device = %device, "device allowed for resizing is not usable");
                continue;
            };
            let info = staging.resize_info(device)?;
            if !info.resize_ok {
                debug!(device = %device, "device cannot be resized");
                continue;
            }

            let new_size = info.min_size.align_up(grain);
            if new_size >= current {
                continue;
            }
            match staging.resize(device, new_size) {
                Ok(()) => info!(
                    device = %device,
                    from = %current,
                    to = %new_size,
                    freed = %(current - new_size),
                    "shrunk device to make space"
                ),
                Err(err) => warn!(device = %device, error = %err, "failed to shrink device, skipping"),
            }
        }

        Ok(staging)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devicegraph::{
        Disk, Partition, PartitionId, PartitionKind, PartitionTableType, ResizeInfo,
    };
    use crate::domain::Region;
    use crate::proposal::free_space::FreeSpaceScanner;
    use crate::proposal::settings::VolumeSpec;

    const MIB_BLOCKS: u64 = 2048;

    fn windows_graph(resize_ok: bool) -> Devicegraph {
        let mut disk = Disk::new("/dev/sda", DiskSize::gib(20)).with_partition_table(PartitionTableType::Gpt);
        if let Some(table) = disk.partition_table.as_mut() {
            let mut windows = Partition::new(
                "/dev/sda1".into(),
                1,
                Region::new(MIB_BLOCKS, 16 * 1024 * MIB_BLOCKS, 512),
                PartitionKind::Primary,
                PartitionId::Windows,
            );
            windows.resize_info = Some(ResizeInfo {
                resize_ok,
                min_size: DiskSize::mib(4000),
                max_size: DiskSize::gib(16),
            });
            table.partitions.push(windows);
        }
        Devicegraph::new().with_disk(disk)
    }

    fn settings(resize: &[&str]) -> ProposalSettings {
        let mut settings = ProposalSettings::new(&["/dev/sda"], vec![VolumeSpec::new("/", crate::devicegraph::FilesystemType::Ext4)]);
        settings.resize_allowed = resize.iter().map(|d| d.to_string()).collect();
        settings
    }

    #[test]
    fn test_shrinks_to_aligned_minimum() {
        let graph = windows_graph(true);
        let staging = ResizeSpaceMaker::new()
            .make_space(&graph, &settings(&["/dev/sda1"]))
            .unwrap();

        assert_eq!(staging.find_device("/dev/sda1").unwrap().size(), DiskSize::mib(4000));
        assert_eq!(graph.find_device("/dev/sda1").unwrap().size(), DiskSize::gib(16));

        let spaces = FreeSpaceScanner::new().scan(&staging, &["/dev/sda".to_string()]);
        let free: DiskSize = spaces.iter().map(|s| s.usable_size()).sum();
        assert_eq!(free, DiskSize::mib(20 * 1024 - 1 - 4000 - 1));
    }

    #[test]
    fn test_fixed_and_unlisted_devices_stay() {
        let graph = windows_graph(false);
        let staging = ResizeSpaceMaker::new()
            .make_space(&graph, &settings(&["/dev/sda1", "/dev/sdz9"]))
            .unwrap();
        assert_eq!(staging, graph);

        let untouched = ResizeSpaceMaker::new()
            .make_space(&windows_graph(true), &settings(&[]))
            .unwrap();
        assert_eq!(untouched, windows_graph(true));
    }
}
