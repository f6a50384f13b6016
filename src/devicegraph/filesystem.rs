//! Filesystem kinds known to the proposal

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Filesystem to put on a planned or existing block device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FilesystemType {
    Ext4,
    Xfs,
    Btrfs,
    Vfat,
    Swap,
}

impl FilesystemType {
    pub fn is_swap(&self) -> bool {
        matches!(self, FilesystemType::Swap)
    }

    /// Only btrfs can carry subvolumes
    pub fn supports_subvolumes(&self) -> bool {
        matches!(self, FilesystemType::Btrfs)
    }
}

impl fmt::Display for FilesystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilesystemType::Ext4 => write!(f, "ext4"),
            FilesystemType::Xfs => write!(f, "xfs"),
            FilesystemType::Btrfs => write!(f, "btrfs"),
            FilesystemType::Vfat => write!(f, "vfat"),
            FilesystemType::Swap => write!(f, "swap"),
        }
    }
}
