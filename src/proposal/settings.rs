//! Proposal Settings
//!
//! Declarative description of the volumes a proposal has to create and
//! the constraints it runs under. Settings are immutable for the duration
//! of a proposal.

use super::target::SizingTarget;
use crate::devicegraph::{FilesystemType, PartitionTableType};
use crate::domain::DiskSize;
use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

fn default_filesystem() -> FilesystemType {
    FilesystemType::Ext4
}

fn default_max_size() -> DiskSize {
    DiskSize::UNLIMITED
}

fn default_vg_name() -> String {
    "system".to_string()
}

// =============================================================================
// Volume Spec
// =============================================================================

/// One volume the proposal should create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VolumeSpec {
    /// Mount point, or "swap"
    pub mount_point: String,

    #[serde(default = "default_filesystem")]
    pub filesystem: FilesystemType,

    /// Size aimed for by the desired target
    pub desired_size: DiskSize,

    /// Floor used by the min target
    pub min_size: DiskSize,

    #[serde(default = "default_max_size")]
    pub max_size: DiskSize,

    /// Share of leftover space this volume grows into
    #[serde(default)]
    pub weight: u32,

    /// Disk the volume has to be placed on
    #[serde(default)]
    pub disk: Option<String>,

    /// Volume may be left out when it does not fit
    #[serde(default)]
    pub optional: bool,

    /// Btrfs subvolumes to create below the volume
    #[serde(default)]
    pub subvolumes: Vec<String>,
}

impl VolumeSpec {
    pub fn new(mount_point: impl Into<String>, filesystem: FilesystemType) -> Self {
        Self {
            mount_point: mount_point.into(),
            filesystem,
            desired_size: DiskSize::ZERO,
            min_size: DiskSize::ZERO,
            max_size: DiskSize::UNLIMITED,
            weight: 0,
            disk: None,
            optional: false,
            subvolumes: Vec::new(),
        }
    }

    pub fn sizes(mut self, min: DiskSize, desired: DiskSize, max: DiskSize) -> Self {
        self.min_size = min;
        self.desired_size = desired;
        self.max_size = max;
        self
    }

    pub fn weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn on_disk(mut self, disk: impl Into<String>) -> Self {
        self.disk = Some(disk.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_subvolumes(mut self, subvolumes: &[&str]) -> Self {
        self.subvolumes = subvolumes.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Lower size bound for `target`
    pub fn size_for(&self, target: SizingTarget) -> DiskSize {
        match target {
            SizingTarget::Desired => self.desired_size,
            SizingTarget::Min => self.min_size,
        }
    }

    pub fn is_swap(&self) -> bool {
        self.filesystem.is_swap()
    }

    /// Name for a logical volume holding this volume ("/" -> root, "/var/lib" -> var_lib)
    pub fn lv_name(&self) -> String {
        if self.is_swap() {
            return "swap".to_string();
        }
        let trimmed = self.mount_point.trim_matches('/');
        if trimmed.is_empty() {
            "root".to_string()
        } else {
            trimmed.replace('/', "_")
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.is_swap() && !self.mount_point.starts_with('/') {
            return Err(Error::Configuration(format!(
                "mount point {:?} must be absolute",
                self.mount_point
            )));
        }
        if self.min_size > self.desired_size || self.desired_size > self.max_size {
            return Err(Error::Configuration(format!(
                "{}: sizes must satisfy min ({}) <= desired ({}) <= max ({})",
                self.mount_point, self.min_size, self.desired_size, self.max_size
            )));
        }
        if !self.subvolumes.is_empty() && !self.filesystem.supports_subvolumes() {
            return Err(Error::Configuration(format!(
                "{}: subvolumes require btrfs, not {}",
                self.mount_point, self.filesystem
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Proposal Settings
// =============================================================================

/// Immutable input of a proposal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProposalSettings {
    /// Disks the proposal may use, most preferred first
    #[serde(default)]
    pub candidate_disks: Vec<String>,

    /// Volumes to create, in priority order
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,

    #[serde(default)]
    pub use_lvm: bool,

    /// Name of the volume group created in LVM mode
    #[serde(default = "default_vg_name")]
    pub lvm_vg_name: String,

    /// Existing volume group to place logical volumes into
    #[serde(default)]
    pub reuse_volume_group: Option<String>,

    #[serde(default)]
    pub use_encryption: bool,

    /// Existing partitions that may be shrunk to make space
    #[serde(default)]
    pub resize_allowed: Vec<String>,

    /// Ignore USB and other removable disks
    #[serde(default)]
    pub skip_removable: bool,

    /// Table created on disks without one
    #[serde(default)]
    pub default_partition_table: PartitionTableType,
}

impl ProposalSettings {
    pub fn new(candidate_disks: &[&str], volumes: Vec<VolumeSpec>) -> Self {
        Self {
            candidate_disks: candidate_disks.iter().map(|d| d.to_string()).collect(),
            volumes,
            lvm_vg_name: default_vg_name(),
            ..Default::default()
        }
    }

    /// Position of `disk` in the preference order (unknown disks rank last)
    pub fn disk_rank(&self, disk: &str) -> usize {
        self.candidate_disks
            .iter()
            .position(|d| d == disk)
            .unwrap_or(self.candidate_disks.len())
    }

    pub fn validate(&self) -> Result<()> {
        if self.candidate_disks.is_empty() {
            return Err(Error::Configuration("no candidate disks given".into()));
        }
        if self.volumes.is_empty() {
            return Err(Error::Configuration("no volumes to propose".into()));
        }
        if self.use_lvm && self.lvm_vg_name.trim().is_empty() {
            return Err(Error::Configuration("volume group name is empty".into()));
        }

        let mut mount_points = BTreeSet::new();
        for volume in &self.volumes {
            volume.validate()?;
            if !mount_points.insert(volume.mount_point.as_str()) {
                return Err(Error::Configuration(format!(
                    "mount point {} is used twice",
                    volume.mount_point
                )));
            }
            if let Some(disk) = &volume.disk {
                if !self.candidate_disks.contains(disk) {
                    return Err(Error::Configuration(format!(
                        "{} is restricted to {} which is not a candidate disk",
                        volume.mount_point, disk
                    )));
                }
            }
        }
        Ok(())
    }
}
