//! Planned Device Set
//!
//! Turns the volume specs of the settings into sized planned devices for
//! one sizing target. The transformation is pure and is repeated for every
//! target of the ladder.

use super::{
    PlannedDevice, PlannedLogicalVolume, PlannedPartition, PlannedPhysicalVolume, PlannedSubvolume,
    PlannedVolume, PlannedVolumeGroup,
};
use crate::devicegraph::{FilesystemType, PartitionId, DEFAULT_EXTENT_SIZE, LUKS_OVERHEAD, PV_METADATA_SIZE};
use crate::domain::DiskSize;
use crate::error::{Error, Result};
use crate::proposal::settings::{ProposalSettings, VolumeSpec};
use crate::proposal::target::SizingTarget;
use serde::Serialize;
use tracing::debug;

/// Planned devices of one attempt, in settings order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedDeviceSet {
    target: SizingTarget,
    devices: Vec<PlannedDevice>,
}

impl PlannedDeviceSet {
    /// Size every volume of `settings` for `target`
    pub fn build(settings: &ProposalSettings, target: SizingTarget) -> Result<Self> {
        if settings.volumes.is_empty() {
            return Err(Error::Configuration("no volumes to propose".into()));
        }

        let mut devices = Vec::new();
        let mut new_vg_lvs: Vec<PlannedLogicalVolume> = Vec::new();

        for spec in &settings.volumes {
            let lvm_candidate = settings.use_lvm && spec.disk.is_none();
            if !lvm_candidate {
                devices.push(plan_partition(spec, target, settings.use_encryption));
            } else if let Some(vg) = &settings.reuse_volume_group {
                let lv = plan_logical_volume(spec, target, vg, true, settings.use_encryption);
                devices.push(PlannedDevice::LogicalVolume(lv));
            } else {
                // Encryption of a new volume group happens on its physical volume
                let lv = plan_logical_volume(spec, target, &settings.lvm_vg_name, false, false);
                new_vg_lvs.push(lv.clone());
                devices.push(PlannedDevice::LogicalVolume(lv));
            }
            devices.extend(plan_subvolumes(spec));
        }

        if !new_vg_lvs.is_empty() {
            let (vg, pv) = plan_volume_group(&settings.lvm_vg_name, &new_vg_lvs, settings.use_encryption);
            devices.push(PlannedDevice::VolumeGroup(vg));
            devices.push(PlannedDevice::PhysicalVolume(pv));
        }

        debug!(%target, devices = devices.len(), "planned device set built");
        Ok(Self { target, devices })
    }

    /// Set made of already planned devices
    pub fn from_devices(target: SizingTarget, devices: Vec<PlannedDevice>) -> Self {
        Self { target, devices }
    }

    pub fn target(&self) -> SizingTarget {
        self.target
    }

    pub fn devices(&self) -> &[PlannedDevice] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&PlannedDevice> {
        self.devices.iter().find(|d| d.id() == id)
    }

    /// Devices the solver places into free space
    pub fn space_consumers(&self) -> impl Iterator<Item = &PlannedDevice> {
        self.devices.iter().filter(|d| d.space_demand().is_some())
    }

    /// Logical volumes that live in the volume group `vg`
    pub fn logical_volumes_in<'a>(&'a self, vg: &'a str) -> impl Iterator<Item = &'a PlannedLogicalVolume> {
        self.devices.iter().filter_map(move |d| match d {
            PlannedDevice::LogicalVolume(lv) if lv.vg_name == vg => Some(lv),
            _ => None,
        })
    }

    pub fn subvolumes(&self) -> impl Iterator<Item = &PlannedSubvolume> {
        self.devices.iter().filter_map(|d| match d {
            PlannedDevice::BtrfsSubvolume(sv) => Some(sv),
            _ => None,
        })
    }

    /// Sum of the minimal sizes of all mandatory space consumers
    pub fn required_size(&self) -> DiskSize {
        self.space_consumers()
            .filter(|d| !d.is_optional())
            .map(|d| d.min_size())
            .sum()
    }
}

fn base_volume(spec: &VolumeSpec, target: SizingTarget, id: String) -> PlannedVolume {
    let mut volume = PlannedVolume::new(id, spec.size_for(target), spec.max_size, spec.weight);
    volume.disk = spec.disk.clone();
    volume.optional = spec.optional;
    volume
}

fn with_luks(mut volume: PlannedVolume) -> PlannedVolume {
    volume.min_size = volume.min_size + LUKS_OVERHEAD;
    volume.max_size = volume.max_size + LUKS_OVERHEAD;
    volume
}

fn partition_id_for(spec: &VolumeSpec) -> PartitionId {
    match (spec.filesystem, spec.mount_point.as_str()) {
        (FilesystemType::Swap, _) => PartitionId::Swap,
        (FilesystemType::Vfat, "/boot/efi") => PartitionId::Esp,
        _ => PartitionId::Linux,
    }
}

fn plan_partition(spec: &VolumeSpec, target: SizingTarget, encrypt: bool) -> PlannedDevice {
    let volume = base_volume(spec, target, spec.mount_point.clone());
    let partition_id = partition_id_for(spec);
    // The ESP has to stay readable by the firmware
    let encrypt = encrypt && partition_id != PartitionId::Esp;
    PlannedDevice::Partition(PlannedPartition {
        volume: if encrypt { with_luks(volume) } else { volume },
        filesystem: spec.filesystem,
        mount_point: spec.mount_point.clone(),
        partition_id,
        encrypt,
    })
}

fn plan_logical_volume(
    spec: &VolumeSpec,
    target: SizingTarget,
    vg_name: &str,
    reuse: bool,
    encrypt: bool,
) -> PlannedLogicalVolume {
    let volume = base_volume(spec, target, spec.mount_point.clone());
    PlannedLogicalVolume {
        volume: if encrypt { with_luks(volume) } else { volume },
        vg_name: vg_name.to_string(),
        lv_name: spec.lv_name(),
        filesystem: spec.filesystem,
        mount_point: spec.mount_point.clone(),
        encrypt,
        reuse,
    }
}

fn plan_subvolumes(spec: &VolumeSpec) -> Vec<PlannedDevice> {
    spec.subvolumes
        .iter()
        .map(|path| {
            PlannedDevice::BtrfsSubvolume(PlannedSubvolume {
                volume: PlannedVolume::new(
                    format!("{}[{}]", spec.mount_point, path),
                    DiskSize::ZERO,
                    DiskSize::ZERO,
                    0,
                ),
                parent_mount: spec.mount_point.clone(),
                path: path.clone(),
            })
        })
        .collect()
}

/// Container plus the single physical volume backing a new volume group
fn plan_volume_group(
    vg_name: &str,
    lvs: &[PlannedLogicalVolume],
    encrypt: bool,
) -> (PlannedVolumeGroup, PlannedPhysicalVolume) {
    let extent = DEFAULT_EXTENT_SIZE;
    let mandatory = lvs.iter().filter(|lv| !lv.volume.optional);

    let min: DiskSize = mandatory.map(|lv| lv.volume.min_size.align_up(extent)).sum();
    let max: DiskSize = lvs.iter().map(|lv| lv.volume.max_size.align_up(extent)).sum();
    let weight: u32 = lvs.iter().map(|lv| lv.volume.weight).sum();

    let vg = PlannedVolumeGroup {
        volume: PlannedVolume::new(format!("vg:{}", vg_name), min, max, weight),
        vg_name: vg_name.to_string(),
        extent_size: extent,
        lvs: lvs.iter().map(|lv| lv.volume.id.clone()).collect(),
    };

    let mut pv_volume = PlannedVolume::new(
        format!("pv:{}", vg_name),
        min + PV_METADATA_SIZE,
        max + PV_METADATA_SIZE,
        weight,
    );
    if encrypt {
        pv_volume = with_luks(pv_volume);
    }
    let pv = PlannedPhysicalVolume {
        volume: pv_volume,
        vg_name: vg_name.to_string(),
        encrypt,
    };
    (vg, pv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::planned::SpaceDemand;

    fn settings() -> ProposalSettings {
        ProposalSettings::new(
            &["/dev/sda", "/dev/sdb"],
            vec![
                VolumeSpec::new("/", FilesystemType::Btrfs)
                    .sizes(DiskSize::gib(5), DiskSize::gib(10), DiskSize::gib(50))
                    .weight(2)
                    .with_subvolumes(&["@/home", "@/var"]),
                VolumeSpec::new("swap", FilesystemType::Swap).sizes(
                    DiskSize::gib(1),
                    DiskSize::gib(2),
                    DiskSize::gib(2),
                ),
                VolumeSpec::new("/boot/efi", FilesystemType::Vfat)
                    .sizes(DiskSize::mib(256), DiskSize::mib(512), DiskSize::mib(512))
                    .on_disk("/dev/sda"),
            ],
        )
    }

    #[test]
    fn test_partitions_per_target() {
        let desired = PlannedDeviceSet::build(&settings(), SizingTarget::Desired).unwrap();
        assert_eq!(desired.get("/").unwrap().min_size(), DiskSize::gib(10));
        assert_eq!(desired.get("/").unwrap().weight(), 2);

        let min = PlannedDeviceSet::build(&settings(), SizingTarget::Min).unwrap();
        assert_eq!(min.get("/").unwrap().min_size(), DiskSize::gib(5));
        assert_eq!(min.get("/").unwrap().max_size(), DiskSize::gib(50));
        assert!(min.required_size() <= desired.required_size());
    }

    #[test]
    fn test_partition_ids_and_subvolumes() {
        let set = PlannedDeviceSet::build(&settings(), SizingTarget::Desired).unwrap();
        match set.get("swap") {
            Some(PlannedDevice::Partition(p)) => assert_eq!(p.partition_id, PartitionId::Swap),
            other => panic!("unexpected {:?}", other),
        }
        match set.get("/boot/efi") {
            Some(PlannedDevice::Partition(p)) => assert_eq!(p.partition_id, PartitionId::Esp),
            other => panic!("unexpected {:?}", other),
        }
        let paths: Vec<_> = set.subvolumes().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["@/home", "@/var"]);
        assert_eq!(set.space_consumers().count(), 3);
    }

    #[test]
    fn test_encryption_adds_luks_overhead() {
        let mut settings = settings();
        settings.use_encryption = true;
        let set = PlannedDeviceSet::build(&settings, SizingTarget::Desired).unwrap();
        assert_eq!(set.get("/").unwrap().min_size(), DiskSize::gib(10) + LUKS_OVERHEAD);
        assert_eq!(set.get("/boot/efi").unwrap().min_size(), DiskSize::mib(512));
    }

    #[test]
    fn test_lvm_plans_volume_group() {
        let mut settings = settings();
        settings.use_lvm = true;
        let set = PlannedDeviceSet::build(&settings, SizingTarget::Desired).unwrap();

        assert!(matches!(set.get("/"), Some(PlannedDevice::LogicalVolume(_))));
        assert!(matches!(set.get("/boot/efi"), Some(PlannedDevice::Partition(_))));

        let pv = set.get("pv:system").unwrap();
        assert_eq!(pv.min_size(), DiskSize::gib(12) + PV_METADATA_SIZE);
        assert_eq!(pv.weight(), 2);
        assert_eq!(pv.space_demand(), Some(SpaceDemand::Partition));
        assert!(set.get("/").unwrap().space_demand().is_none());

        match set.get("vg:system") {
            Some(PlannedDevice::VolumeGroup(vg)) => assert_eq!(vg.lvs, vec!["/", "swap"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_lvm_reuses_volume_group() {
        let mut settings = settings();
        settings.use_lvm = true;
        settings.reuse_volume_group = Some("data".into());
        let set = PlannedDeviceSet::build(&settings, SizingTarget::Min).unwrap();

        assert!(set.get("pv:system").is_none());
        assert_eq!(
            set.get("/").unwrap().space_demand(),
            Some(SpaceDemand::Extents("data"))
        );
        assert_eq!(set.logical_volumes_in("data").count(), 2);
    }
}
