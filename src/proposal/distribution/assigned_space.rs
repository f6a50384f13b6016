//! Assigned Space
//!
//! One free region together with the planned devices placed inside it and
//! the sizes they end up with.

use crate::domain::{DiskSize, Region};
use crate::proposal::free_space::FreeDiskSpace;
use crate::proposal::planned::PlannedDevice;
use serde::Serialize;
use std::fmt;

/// Devices placed in one free region
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignedSpace {
    pub space: FreeDiskSpace,
    devices: Vec<PlannedDevice>,
    /// Current size of every device, grain aligned
    sizes: Vec<DiskSize>,
}

impl AssignedSpace {
    pub fn new(space: FreeDiskSpace) -> Self {
        Self {
            space,
            devices: Vec::new(),
            sizes: Vec::new(),
        }
    }

    /// Space `device` takes from `space` at its minimal size
    pub fn cost_of(space: &FreeDiskSpace, device: &PlannedDevice) -> DiskSize {
        device.min_size().align_up(space.grain) + space.device_overhead()
    }

    pub fn push(&mut self, device: PlannedDevice) {
        self.sizes.push(device.min_size().align_up(self.space.grain));
        self.devices.push(device);
    }

    pub fn devices(&self) -> &[PlannedDevice] {
        &self.devices
    }

    pub fn sizes(&self) -> &[DiskSize] {
        &self.sizes
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Devices paired with their current size
    pub fn sized_devices(&self) -> impl Iterator<Item = (&PlannedDevice, DiskSize)> {
        self.devices.iter().zip(self.sizes.iter().copied())
    }

    pub fn size_of(&self, id: &str) -> Option<DiskSize> {
        self.sized_devices()
            .find(|(d, _)| d.id() == id)
            .map(|(_, size)| size)
    }

    /// Space taken by the placed devices including per-device overhead
    pub fn required_size(&self) -> DiskSize {
        let overhead = self.space.device_overhead().to_bytes() * self.devices.len() as u64;
        self.sizes.iter().sum::<DiskSize>() + DiskSize::b(overhead)
    }

    pub fn fits(&self) -> bool {
        self.required_size() <= self.space.usable_size()
    }

    /// Whether `device` could still be added at its minimal size
    pub fn has_room_for(&self, device: &PlannedDevice) -> bool {
        self.required_size() + Self::cost_of(&self.space, device) <= self.space.usable_size()
    }

    /// Usable space not taken by any device
    pub fn leftover(&self) -> DiskSize {
        self.space.usable_size().saturating_sub(self.required_size())
    }

    /// Grow the devices into the leftover space according to their weights
    pub fn grow(&mut self) {
        let grain = self.space.grain;
        let weights: Vec<u32> = self.devices.iter().map(|d| d.weight()).collect();
        let maxes: Vec<DiskSize> = self
            .devices
            .iter()
            .map(|d| d.max_size().align_down(grain))
            .collect();
        let surplus = self.leftover();
        distribute_surplus(&mut self.sizes, &weights, &maxes, surplus, grain);
    }

    /// Regions of the devices, laid out one after another from the start.
    /// For volume group space the blocks of the region are extents.
    pub fn layout(&self) -> Vec<(&PlannedDevice, Region)> {
        let usable = self.space.usable_region();
        let overhead = self.space.device_overhead();
        let mut offset = DiskSize::ZERO;

        self.sized_devices()
            .map(|(device, size)| {
                offset += overhead;
                let region = usable.sub_region(offset, size);
                offset += size;
                (device, region)
            })
            .collect()
    }
}

impl fmt::Display for AssignedSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.devices.iter().map(|d| d.id()).collect();
        write!(f, "{} <- [{}]", self.space, ids.join(", "))
    }
}

/// Spread `surplus` over `sizes` proportionally to `weights`, never beyond
/// `maxes`. Space a capped device cannot take goes to the others in further
/// rounds. Returns what could not be handed out.
pub fn distribute_surplus(
    sizes: &mut [DiskSize],
    weights: &[u32],
    maxes: &[DiskSize],
    surplus: DiskSize,
    grain: DiskSize,
) -> DiskSize {
    let mut remaining = surplus;

    loop {
        let open: Vec<usize> = (0..sizes.len())
            .filter(|&i| weights[i] > 0 && sizes[i] < maxes[i])
            .collect();
        if open.is_empty() || remaining < grain.max(DiskSize::b(1)) {
            break;
        }

        let total_weight: u64 = open.iter().map(|&i| weights[i] as u64).sum();
        let mut given = DiskSize::ZERO;
        let mut capped = false;

        for &i in &open {
            let share = remaining.scale(weights[i] as u64, total_weight).align_down(grain);
            let room = maxes[i].saturating_sub(sizes[i]);
            let add = share.min(room);
            if add == room {
                capped = true;
            }
            sizes[i] += add;
            given += add;
        }

        remaining -= given;
        if !capped {
            // rounding left-overs go to the first device that can take them
            if let Some(&i) = open.iter().find(|&&i| sizes[i] < maxes[i]) {
                let add = remaining.align_down(grain).min(maxes[i].saturating_sub(sizes[i]));
                sizes[i] += add;
                remaining -= add;
            }
            break;
        }
        if given.is_zero() {
            break;
        }
    }

    remaining
}
