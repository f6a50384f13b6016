//! Device Graph Mutator
//!
//! Commits a winning distribution into a staging graph: partition tables
//! for blank disks, partitions and physical volumes at their laid out
//! regions, logical volumes in reused groups, then the new volume group
//! with its logical volumes and finally the btrfs subvolumes.

use super::distribution::{distribute_surplus, PartitionsDistribution};
use super::free_space::SpaceOwner;
use super::planned::{PlannedDevice, PlannedDeviceSet, PlannedVolumeGroup, Placement};
use super::settings::ProposalSettings;
use crate::devicegraph::{Devicegraph, FilesystemType};
use crate::domain::{CreatedDevice, CreatedKind, DevicegraphMutator, DiskSize};
use crate::error::{Error, Result};
use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Mutator creating devices through the device graph primitives
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphMutator;

impl GraphMutator {
    pub fn new() -> Self {
        Self
    }

    /// Create the logical volumes of a freshly created volume group.
    ///
    /// Mandatory volumes get their minimum first, optional ones only while
    /// extents are left, and the rest of the group is spread by weight.
    fn create_logical_volumes(
        &self,
        graph: &mut Devicegraph,
        planned: &PlannedDeviceSet,
        vg: &PlannedVolumeGroup,
        created: &mut Vec<CreatedDevice>,
        mounts: &mut HashMap<String, String>,
    ) -> Result<()> {
        let group = graph.volume_group(&vg.vg_name)?;
        let extent = group.extent_size;
        let mut free = DiskSize::b(group.free_extents() * extent.to_bytes());

        let lvs: Vec<&PlannedDevice> = planned
            .devices()
            .iter()
            .filter(|d| matches!(d, PlannedDevice::LogicalVolume(lv) if lv.vg_name == vg.vg_name && !lv.reuse))
            .collect();

        let mut chosen = vec![false; lvs.len()];
        for pass_optional in [false, true] {
            for (i, lv) in lvs.iter().enumerate() {
                if lv.is_optional() != pass_optional {
                    continue;
                }
                let need = lv.min_size().align_up(extent);
                if need <= free {
                    free -= need;
                    chosen[i] = true;
                } else if pass_optional {
                    warn!(lv = lv.id(), vg = %vg.vg_name, "no room left for optional volume, skipping");
                } else {
                    return Err(Error::Proposal(format!(
                        "volume group {} cannot hold {} ({} needed, {} free)",
                        vg.vg_name,
                        lv.id(),
                        need,
                        free
                    )));
                }
            }
        }

        let selected: Vec<&PlannedDevice> = lvs
            .iter()
            .zip(&chosen)
            .filter(|(_, keep)| **keep)
            .map(|(lv, _)| *lv)
            .collect();
        let mut sizes: Vec<DiskSize> = selected.iter().map(|lv| lv.min_size().align_up(extent)).collect();
        let weights: Vec<u32> = selected.iter().map(|lv| lv.weight()).collect();
        let maxes: Vec<DiskSize> = selected
            .iter()
            .zip(&sizes)
            .map(|(lv, size)| lv.max_size().align_down(extent).max(*size))
            .collect();
        let unused = distribute_surplus(&mut sizes, &weights, &maxes, free, extent);
        debug!(vg = %vg.vg_name, unused = %unused, "sized logical volumes");

        for (lv, size) in selected.into_iter().zip(sizes) {
            let name = lv.materialize(
                graph,
                Placement::VolumeGroup {
                    vg: &vg.vg_name,
                    size,
                },
            )?;
            created.push(record(graph, lv, &name, CreatedKind::LogicalVolume));
            if let Some(mount) = lv.mount_point() {
                mounts.insert(mount.to_string(), name);
            }
        }
        Ok(())
    }
}

impl DevicegraphMutator for GraphMutator {
    fn materialize(
        &self,
        graph: &mut Devicegraph,
        planned: &PlannedDeviceSet,
        distribution: &PartitionsDistribution,
        _settings: &ProposalSettings,
    ) -> Result<Vec<CreatedDevice>> {
        let mut created = Vec::new();
        let mut mounts: HashMap<String, String> = HashMap::new();
        let mut physical_volumes: IndexMap<String, Vec<String>> = IndexMap::new();

        // =====================================================================
        // Partitions, physical volumes and logical volumes of reused groups
        // =====================================================================

        for assigned in distribution.spaces() {
            let space = &assigned.space;
            match &space.owner {
                SpaceOwner::Disk(disk) => {
                    if let Some(table_type) = space.new_table {
                        let blank = graph.disk(disk)?.partition_table.is_none();
                        if blank {
                            graph.create_partition_table(disk, table_type)?;
                            created.push(CreatedDevice {
                                name: disk.clone(),
                                kind: CreatedKind::PartitionTable,
                                size: graph.disk(disk)?.size,
                                mount_point: None,
                                filesystem: None,
                            });
                        }
                    }

                    let kind = space.partition_kind();
                    for (device, region) in assigned.layout() {
                        let name = device.materialize(graph, Placement::Region { disk, region, kind })?;
                        match device {
                            PlannedDevice::PhysicalVolume(pv) => {
                                physical_volumes
                                    .entry(pv.vg_name.clone())
                                    .or_default()
                                    .push(name.clone());
                                created.push(record(graph, device, &name, CreatedKind::PhysicalVolume));
                            }
                            _ => created.push(record(graph, device, &name, CreatedKind::Partition)),
                        }
                        if let Some(mount) = device.mount_point() {
                            mounts.insert(mount.to_string(), name);
                        }
                    }
                }
                SpaceOwner::VolumeGroup(vg) => {
                    for (device, size) in assigned.sized_devices() {
                        let name = device.materialize(graph, Placement::VolumeGroup { vg, size })?;
                        created.push(record(graph, device, &name, CreatedKind::LogicalVolume));
                        if let Some(mount) = device.mount_point() {
                            mounts.insert(mount.to_string(), name);
                        }
                    }
                }
            }
        }

        // =====================================================================
        // New volume groups
        // =====================================================================

        for device in planned.devices() {
            let PlannedDevice::VolumeGroup(vg) = device else {
                continue;
            };
            let pvs = physical_volumes.get(&vg.vg_name).ok_or_else(|| {
                Error::Proposal(format!("volume group {} has no physical volume", vg.vg_name))
            })?;
            let name = device.materialize(graph, Placement::PhysicalVolumes(pvs))?;
            created.push(CreatedDevice {
                name,
                kind: CreatedKind::VolumeGroup,
                size: graph.volume_group(&vg.vg_name)?.size(),
                mount_point: None,
                filesystem: None,
            });
            self.create_logical_volumes(graph, planned, vg, &mut created, &mut mounts)?;
        }

        // =====================================================================
        // Btrfs subvolumes
        // =====================================================================

        for device in planned.devices() {
            let PlannedDevice::BtrfsSubvolume(sv) = device else {
                continue;
            };
            let Some(parent) = mounts.get(&sv.parent_mount) else {
                // parent was an optional volume that got dropped
                warn!(subvolume = %sv.path, parent = %sv.parent_mount, "parent volume not created, skipping subvolume");
                continue;
            };
            let name = device.materialize(graph, Placement::Parent(parent))?;
            created.push(CreatedDevice {
                name,
                kind: CreatedKind::BtrfsSubvolume,
                size: DiskSize::ZERO,
                mount_point: Some(format!("{}/{}", sv.parent_mount.trim_end_matches('/'), sv.path)),
                filesystem: Some(FilesystemType::Btrfs),
            });
        }

        info!(created = created.len(), "device graph updated");
        Ok(created)
    }
}

fn record(graph: &Devicegraph, device: &PlannedDevice, name: &str, kind: CreatedKind) -> CreatedDevice {
    let filesystem = match device {
        PlannedDevice::Partition(p) => Some(p.filesystem),
        PlannedDevice::LogicalVolume(lv) => Some(lv.filesystem),
        _ => None,
    };
    CreatedDevice {
        name: name.to_string(),
        kind,
        size: graph
            .find_device(name)
            .map(|d| d.size())
            .unwrap_or(DiskSize::ZERO),
        mount_point: device.mount_point().map(str::to_string),
        filesystem,
    }
}
