//! Partition Tables
//!
//! GPT and MS-DOS partition tables with their slot rules and unused regions.

use super::filesystem::FilesystemType;
use crate::domain::{DiskSize, Region};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// Constants
// =============================================================================

/// Default alignment of partitions: 1 MiB
pub const DEFAULT_GRAIN: DiskSize = DiskSize::mib(1);

/// Number of partition entries of a standard GPT
pub const GPT_MAX_PARTITIONS: u32 = 128;

/// Primary (and extended) slots of an MS-DOS table
pub const MSDOS_MAX_PRIMARY: u32 = 4;

/// Highest partition number the kernel exposes
pub const MAX_PARTITION_NUMBER: u32 = 255;

/// Blocks at the disk end holding the backup GPT header and entries
const GPT_BACKUP_BLOCKS: u64 = 33;

fn default_grain() -> DiskSize {
    DEFAULT_GRAIN
}

// =============================================================================
// Enums
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PartitionTableType {
    #[default]
    Gpt,
    Msdos,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PartitionKind {
    #[default]
    Primary,
    Extended,
    Logical,
}

/// Partition type id
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PartitionId {
    #[default]
    Linux,
    Swap,
    Lvm,
    Esp,
    BiosBoot,
    Windows,
}

/// Resize capabilities of an existing device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ResizeInfo {
    pub resize_ok: bool,
    pub min_size: DiskSize,
    pub max_size: DiskSize,
}

impl ResizeInfo {
    pub fn fixed(size: DiskSize) -> Self {
        Self {
            resize_ok: false,
            min_size: size,
            max_size: size,
        }
    }
}

// =============================================================================
// Partition
// =============================================================================

/// A partition inside a partition table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Partition {
    /// Device name, derived from the disk name and number when loading
    #[serde(default)]
    pub name: String,
    pub number: u32,
    pub region: Region,
    #[serde(default)]
    pub kind: PartitionKind,
    #[serde(default)]
    pub id: PartitionId,
    #[serde(default)]
    pub filesystem: Option<FilesystemType>,
    #[serde(default)]
    pub mount_point: Option<String>,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    pub subvolumes: Vec<String>,
    /// Present for devices whose filesystem reported resize limits
    #[serde(default)]
    pub resize_info: Option<ResizeInfo>,
}

impl Partition {
    pub fn new(name: String, number: u32, region: Region, kind: PartitionKind, id: PartitionId) -> Self {
        Self {
            name,
            number,
            region,
            kind,
            id,
            filesystem: None,
            mount_point: None,
            encrypted: false,
            subvolumes: Vec::new(),
            resize_info: None,
        }
    }

    pub fn size(&self) -> DiskSize {
        self.region.size()
    }
}

// =============================================================================
// Partition Table
// =============================================================================

/// Partition table of a disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PartitionTable {
    #[serde(rename = "type", default)]
    pub table_type: PartitionTableType,
    /// Alignment of partition boundaries
    #[serde(default = "default_grain")]
    pub grain: DiskSize,
    #[serde(default)]
    pub partitions: Vec<Partition>,
}

impl PartitionTable {
    pub fn new(table_type: PartitionTableType) -> Self {
        Self {
            table_type,
            grain: DEFAULT_GRAIN,
            partitions: Vec::new(),
        }
    }

    /// Number of slots usable by primary and extended partitions
    pub fn max_primary(&self) -> u32 {
        match self.table_type {
            PartitionTableType::Gpt => GPT_MAX_PARTITIONS,
            PartitionTableType::Msdos => MSDOS_MAX_PRIMARY,
        }
    }

    pub fn extended(&self) -> Option<&Partition> {
        self.partitions
            .iter()
            .find(|p| p.kind == PartitionKind::Extended)
    }

    pub fn primary_slots_used(&self) -> u32 {
        self.partitions
            .iter()
            .filter(|p| p.kind != PartitionKind::Logical)
            .count() as u32
    }

    pub fn free_primary_slots(&self) -> u32 {
        self.max_primary().saturating_sub(self.primary_slots_used())
    }

    /// Logical partitions can be added as long as an extended partition exists
    pub fn free_logical_slots(&self) -> u32 {
        if self.extended().is_none() {
            return 0;
        }
        let highest = self
            .partitions
            .iter()
            .filter(|p| p.kind == PartitionKind::Logical)
            .map(|p| p.number)
            .max()
            .unwrap_or(MSDOS_MAX_PRIMARY);
        MAX_PARTITION_NUMBER.saturating_sub(highest)
    }

    pub fn free_slots(&self, kind: PartitionKind) -> u32 {
        match kind {
            PartitionKind::Primary | PartitionKind::Extended => self.free_primary_slots(),
            PartitionKind::Logical => self.free_logical_slots(),
        }
    }

    /// Number for the next partition of `kind`, if any slot is left
    pub fn next_number(&self, kind: PartitionKind) -> Option<u32> {
        if self.free_slots(kind) == 0 {
            return None;
        }
        match kind {
            PartitionKind::Logical => Some(
                self.partitions
                    .iter()
                    .filter(|p| p.kind == PartitionKind::Logical)
                    .map(|p| p.number + 1)
                    .max()
                    .unwrap_or(MSDOS_MAX_PRIMARY + 1),
            ),
            _ => (1..=self.max_primary())
                .find(|n| !self.partitions.iter().any(|p| p.number == *n)),
        }
    }

    /// Part of the disk that may hold partitions
    pub fn usable_region(&self, disk_region: &Region) -> Region {
        let grain_blocks = (self.grain.to_bytes() / disk_region.block_size).max(1);
        let start = grain_blocks.min(disk_region.length);
        let end = match self.table_type {
            PartitionTableType::Gpt => disk_region.end_exclusive().saturating_sub(GPT_BACKUP_BLOCKS),
            PartitionTableType::Msdos => disk_region.end_exclusive(),
        };
        Region::new(start, end.saturating_sub(start), disk_region.block_size)
    }

    /// Gaps not covered by any partition, tagged with the kind of partition
    /// that could be created there
    pub fn unused_regions(&self, disk_region: &Region) -> Vec<(Region, PartitionKind)> {
        let usable = self.usable_region(disk_region);
        let outer: Vec<Region> = self
            .partitions
            .iter()
            .filter(|p| p.kind != PartitionKind::Logical)
            .map(|p| p.region)
            .collect();

        let mut unused: Vec<(Region, PartitionKind)> = gaps(&usable, outer)
            .into_iter()
            .map(|r| (r, PartitionKind::Primary))
            .collect();

        if let Some(extended) = self.extended() {
            let logicals: Vec<Region> = self
                .partitions
                .iter()
                .filter(|p| p.kind == PartitionKind::Logical)
                .map(|p| p.region)
                .collect();
            unused.extend(
                gaps(&extended.region, logicals)
                    .into_iter()
                    .map(|r| (r, PartitionKind::Logical)),
            );
        }

        unused.sort_by_key(|(r, _)| r.start);
        unused
    }

    /// Region a new partition of `kind` has to stay inside of
    pub fn container_region(&self, disk_region: &Region, kind: PartitionKind) -> Option<Region> {
        match kind {
            PartitionKind::Logical => self.extended().map(|e| e.region),
            _ => Some(self.usable_region(disk_region)),
        }
    }
}

/// Free stretches of `outer` not covered by `used`
fn gaps(outer: &Region, mut used: Vec<Region>) -> Vec<Region> {
    used.sort_by_key(|r| r.start);
    let mut result = Vec::new();
    let mut cursor = outer.start;

    for region in used {
        if region.start > cursor {
            let end = region.start.min(outer.end_exclusive());
            if end > cursor {
                result.push(Region::new(cursor, end - cursor, outer.block_size));
            }
        }
        cursor = cursor.max(region.end_exclusive());
    }

    if cursor < outer.end_exclusive() {
        result.push(Region::new(
            cursor,
            outer.end_exclusive() - cursor,
            outer.block_size,
        ));
    }

    result
}
