//! Partitions Distribution
//!
//! A complete assignment of planned devices to free regions, scored by a
//! `ScoringPolicy`.

use super::assigned_space::AssignedSpace;
use super::policy::{DistributionScore, ScoringPolicy};
use crate::domain::DiskSize;
use crate::proposal::free_space::SpaceOwner;
use crate::proposal::planned::PlannedDevice;
use serde::Serialize;
use std::fmt;

/// Assignment of planned devices to free regions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionsDistribution {
    spaces: Vec<AssignedSpace>,
    score: DistributionScore,
}

impl PartitionsDistribution {
    /// Score the non-empty `spaces`; `disk_order` gives the preferred disks first
    pub fn new(spaces: Vec<AssignedSpace>, policy: &ScoringPolicy, disk_order: &[String]) -> Self {
        let spaces: Vec<AssignedSpace> = spaces.into_iter().filter(|s| !s.is_empty()).collect();
        let wasted: DiskSize = spaces.iter().map(|s| s.leftover()).sum();
        let rank_sum: usize = spaces
            .iter()
            .map(|s| disk_rank(&s.space.owner, disk_order))
            .sum();
        let score = policy.score(spaces.len(), wasted, rank_sum);
        Self { spaces, score }
    }

    pub fn spaces(&self) -> &[AssignedSpace] {
        &self.spaces
    }

    pub fn score(&self) -> DistributionScore {
        self.score
    }

    pub fn regions_used(&self) -> usize {
        self.spaces.len()
    }

    /// Leftover space inside the used regions
    pub fn wasted(&self) -> DiskSize {
        self.spaces.iter().map(|s| s.leftover()).sum()
    }

    /// Total size handed to devices
    pub fn assigned_size(&self) -> DiskSize {
        self.spaces
            .iter()
            .flat_map(|s| s.sizes().iter().copied())
            .sum()
    }

    pub fn devices(&self) -> impl Iterator<Item = (&PlannedDevice, DiskSize)> {
        self.spaces.iter().flat_map(|s| s.sized_devices())
    }

    pub fn device_count(&self) -> usize {
        self.spaces.iter().map(|s| s.len()).sum()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.space_of(id).is_some()
    }

    /// Space the device `id` was placed in
    pub fn space_of(&self, id: &str) -> Option<&AssignedSpace> {
        self.spaces
            .iter()
            .find(|s| s.devices().iter().any(|d| d.id() == id))
    }

    pub fn size_of(&self, id: &str) -> Option<DiskSize> {
        self.space_of(id).and_then(|s| s.size_of(id))
    }
}

impl fmt::Display for PartitionsDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "distribution score {}", self.score)?;
        for space in &self.spaces {
            writeln!(f, "  {}", space)?;
        }
        Ok(())
    }
}

/// Position of the owning disk in the preference order; volume groups rank first
pub(crate) fn disk_rank(owner: &SpaceOwner, disk_order: &[String]) -> usize {
    match owner {
        SpaceOwner::Disk(name) => disk_order
            .iter()
            .position(|d| d == name)
            .unwrap_or(disk_order.len()),
        SpaceOwner::VolumeGroup(_) => 0,
    }
}
