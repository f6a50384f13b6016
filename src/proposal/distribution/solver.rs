//! Space Distribution Solver
//!
//! Assigns every mandatory planned device to exactly one free region.
//!
//! The search is a depth-first walk over devices (restricted devices first,
//! then by decreasing minimal size) that tries the region with the most
//! remaining space first, so one region is filled before another is opened.
//! Branches are pruned as soon as a region overflows, a disk runs out of
//! partition slots, or the policy's lower bound cannot beat the best
//! distribution found so far. After the first full distribution the search
//! continues for a bounded number of branches only.

use super::assigned_space::AssignedSpace;
use super::partitions::{disk_rank, PartitionsDistribution};
use super::policy::ScoringPolicy;
use crate::domain::DiskSize;
use crate::error::{Error, Result};
use crate::proposal::free_space::FreeDiskSpace;
use crate::proposal::planned::{PlannedDevice, PlannedDeviceSet};
use crate::proposal::target::SizingTarget;
use std::cmp::Reverse;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// =============================================================================
// Search Budget
// =============================================================================

/// Limits of one search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchBudget {
    /// Placement attempts before the search gives up
    pub max_branches: u64,
    /// Placement attempts allowed after the first full distribution
    pub extra_branches: u64,
    pub time_limit: Option<Duration>,
}

impl Default for SearchBudget {
    fn default() -> Self {
        Self {
            max_branches: 100_000,
            extra_branches: 2_000,
            time_limit: None,
        }
    }
}

/// Winning distribution plus search statistics
#[derive(Debug, Clone)]
pub struct Solved {
    pub distribution: PartitionsDistribution,
    /// Placement attempts explored
    pub branches: u64,
}

// =============================================================================
// Solver
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct SpaceDistributionSolver {
    policy: ScoringPolicy,
    budget: SearchBudget,
    /// Preferred disks first
    disk_order: Vec<String>,
}

impl SpaceDistributionSolver {
    pub fn new(policy: ScoringPolicy, budget: SearchBudget) -> Self {
        Self {
            policy,
            budget,
            disk_order: Vec::new(),
        }
    }

    pub fn with_disk_order(mut self, disks: &[String]) -> Self {
        self.disk_order = disks.to_vec();
        self
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    pub fn budget(&self) -> &SearchBudget {
        &self.budget
    }

    /// Find the best distribution of `planned` over `spaces`
    pub fn solve(&self, spaces: &[FreeDiskSpace], planned: &PlannedDeviceSet) -> Result<Solved> {
        let target = planned.target();
        let consumers: Vec<&PlannedDevice> = planned.space_consumers().collect();

        let mut mandatory: Vec<(usize, &PlannedDevice)> = consumers
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, d)| !d.is_optional())
            .collect();
        let optional: Vec<&PlannedDevice> = consumers
            .iter()
            .copied()
            .filter(|d| d.is_optional())
            .collect();

        for (_, device) in &mandatory {
            check_placeable(spaces, device, target)?;
        }

        mandatory.sort_by_key(|(index, d)| {
            (d.disk_restriction().is_none(), Reverse(d.min_size()), *index)
        });
        let devices: Vec<&PlannedDevice> = mandatory.into_iter().map(|(_, d)| d).collect();

        debug!(
            %target,
            mandatory = devices.len(),
            optional = optional.len(),
            regions = spaces.len(),
            "solving distribution"
        );

        let mut search = Search::new(self, spaces, devices.clone(), optional, false);
        search.descend(0);
        let branches = search.branches;

        if let Some(distribution) = search.best.take() {
            info!(
                %target,
                branches,
                regions = distribution.regions_used(),
                wasted = %distribution.wasted(),
                score = %distribution.score(),
                "distribution found"
            );
            return Ok(Solved {
                distribution,
                branches,
            });
        }

        if search.exhausted {
            warn!(%target, branches, "search budget exhausted without a distribution");
            return Err(Error::no_disk_space(
                target,
                format!("search budget exhausted after {} branches", branches),
            ));
        }

        // Same search without slot limits tells a slot shortage from a space shortage
        let mut relaxed = Search::new(self, spaces, devices, Vec::new(), true);
        relaxed.descend(0);
        if relaxed.best.is_some() {
            Err(Error::NoMorePartitionSlot {
                target: target.to_string(),
            })
        } else {
            Err(Error::no_disk_space(
                target,
                format!(
                    "{} required in total does not fit into the free regions",
                    planned.required_size()
                ),
            ))
        }
    }
}

/// Fail early when a device has no region it could possibly use
fn check_placeable(spaces: &[FreeDiskSpace], device: &PlannedDevice, target: SizingTarget) -> Result<()> {
    let large_enough: Vec<&FreeDiskSpace> = spaces
        .iter()
        .filter(|s| device.accepts(s) && AssignedSpace::cost_of(s, device) <= s.usable_size())
        .collect();

    if large_enough.is_empty() {
        let location = device
            .disk_restriction()
            .map(|disk| format!(" on {}", disk))
            .unwrap_or_default();
        return Err(Error::no_disk_space(
            target,
            format!(
                "{} needs {} but no free region{} is large enough",
                device.id(),
                device.min_size(),
                location
            ),
        ));
    }
    if large_enough.iter().all(|s| s.slots == 0) {
        return Err(Error::NoMorePartitionSlot {
            target: target.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Search State
// =============================================================================

struct Search<'a> {
    spaces: &'a [FreeDiskSpace],
    devices: Vec<&'a PlannedDevice>,
    optional: Vec<&'a PlannedDevice>,
    policy: &'a ScoringPolicy,
    budget: &'a SearchBudget,
    disk_order: &'a [String],
    ranks: Vec<usize>,
    /// Spaces of the same disk and kind share one pool of slots
    slot_group: Vec<usize>,
    group_slots: Vec<u32>,
    /// Ignore slots and stop at the first distribution
    relaxed: bool,

    placement: Vec<usize>,
    used: Vec<DiskSize>,
    counts: Vec<usize>,
    group_used: Vec<u32>,
    regions: usize,

    best: Option<PartitionsDistribution>,
    branches: u64,
    first_solution_at: Option<u64>,
    started: Instant,
    exhausted: bool,
}

impl<'a> Search<'a> {
    fn new(
        solver: &'a SpaceDistributionSolver,
        spaces: &'a [FreeDiskSpace],
        devices: Vec<&'a PlannedDevice>,
        optional: Vec<&'a PlannedDevice>,
        relaxed: bool,
    ) -> Self {
        let mut keys = Vec::new();
        let mut slot_group = Vec::with_capacity(spaces.len());
        let mut group_slots = Vec::new();
        for space in spaces {
            let key = space.slot_key();
            let group = match keys.iter().position(|k| *k == key) {
                Some(group) => group,
                None => {
                    keys.push(key);
                    group_slots.push(space.slots);
                    keys.len() - 1
                }
            };
            slot_group.push(group);
        }

        Self {
            spaces,
            devices,
            optional,
            policy: &solver.policy,
            budget: &solver.budget,
            disk_order: &solver.disk_order,
            ranks: spaces
                .iter()
                .map(|s| disk_rank(&s.owner, &solver.disk_order))
                .collect(),
            slot_group,
            group_used: vec![0; group_slots.len()],
            group_slots,
            relaxed,
            placement: Vec::new(),
            used: vec![DiskSize::ZERO; spaces.len()],
            counts: vec![0; spaces.len()],
            regions: 0,
            best: None,
            branches: 0,
            first_solution_at: None,
            started: Instant::now(),
            exhausted: false,
        }
    }

    fn descend(&mut self, depth: usize) {
        if self.out_of_budget() {
            return;
        }
        if depth == self.devices.len() {
            self.evaluate();
            return;
        }

        let device = self.devices[depth];
        for s in self.candidates(device) {
            let opens = self.counts[s] == 0;
            let regions = self.regions + usize::from(opens);
            if self.cannot_improve(regions) {
                continue;
            }

            self.branches += 1;
            let cost = AssignedSpace::cost_of(&self.spaces[s], device);
            let group = self.slot_group[s];

            self.placement.push(s);
            self.used[s] += cost;
            self.counts[s] += 1;
            self.group_used[group] += 1;
            self.regions = regions;

            self.descend(depth + 1);

            self.placement.pop();
            self.used[s] -= cost;
            self.counts[s] -= 1;
            self.group_used[group] -= 1;
            self.regions = regions - usize::from(opens);

            if self.exhausted || (self.relaxed && self.best.is_some()) {
                return;
            }
        }
    }

    /// Regions `device` still fits into, most remaining space first
    fn candidates(&self, device: &PlannedDevice) -> Vec<usize> {
        let mut candidates: Vec<usize> = (0..self.spaces.len())
            .filter(|&s| {
                let space = &self.spaces[s];
                device.accepts(space)
                    && self.has_slot(s, 0)
                    && self.used[s] + AssignedSpace::cost_of(space, device) <= space.usable_size()
            })
            .collect();
        candidates.sort_by_key(|&s| {
            (
                Reverse(self.spaces[s].usable_size().saturating_sub(self.used[s])),
                self.ranks[s],
                s,
            )
        });
        candidates
    }

    fn has_slot(&self, s: usize, extra: u32) -> bool {
        let group = self.slot_group[s];
        self.relaxed || self.group_used[group] + extra < self.group_slots[group]
    }

    fn cannot_improve(&self, regions: usize) -> bool {
        match &self.best {
            Some(best) if !self.relaxed => self.policy.lower_bound(regions) >= best.score(),
            _ => false,
        }
    }

    fn out_of_budget(&mut self) -> bool {
        if self.exhausted {
            return true;
        }
        let over_branches = self.branches >= self.budget.max_branches;
        let over_extra = self
            .first_solution_at
            .is_some_and(|at| self.branches.saturating_sub(at) >= self.budget.extra_branches);
        let over_time = self
            .budget
            .time_limit
            .is_some_and(|limit| self.started.elapsed() >= limit);
        self.exhausted = over_branches || over_extra || over_time;
        self.exhausted
    }

    /// Complete the current placement with optional devices, grow and score it
    fn evaluate(&mut self) {
        let mut assigned: Vec<AssignedSpace> = self
            .spaces
            .iter()
            .cloned()
            .map(AssignedSpace::new)
            .collect();
        for (device, &s) in self.devices.iter().zip(&self.placement) {
            assigned[s].push((*device).clone());
        }

        let mut extra_slots = vec![0u32; self.group_slots.len()];
        for device in &self.optional {
            let choice = (0..assigned.len())
                .filter(|&s| {
                    device.accepts(&assigned[s].space)
                        && self.has_slot(s, extra_slots[self.slot_group[s]])
                        && assigned[s].has_room_for(device)
                })
                .min_by_key(|&s| {
                    (
                        assigned[s].is_empty(),
                        Reverse(assigned[s].leftover()),
                        self.ranks[s],
                        s,
                    )
                });
            match choice {
                Some(s) => {
                    extra_slots[self.slot_group[s]] += 1;
                    assigned[s].push((*device).clone());
                }
                None => debug!(device = device.id(), "optional device left out"),
            }
        }

        for space in assigned.iter_mut() {
            space.grow();
        }

        let candidate = PartitionsDistribution::new(assigned, self.policy, self.disk_order);
        self.first_solution_at.get_or_insert(self.branches);

        let better = self
            .best
            .as_ref()
            .map_or(true, |best| candidate.score() < best.score());
        if better {
            debug!(score = %candidate.score(), branches = self.branches, "new best distribution");
            self.best = Some(candidate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devicegraph::{
        Devicegraph, Disk, FilesystemType, Partition, PartitionId, PartitionKind, PartitionTableType,
    };
    use crate::domain::Region;
    use crate::proposal::free_space::{FreeSpaceScanner, SpaceKind, SpaceOwner};
    use crate::proposal::planned::{PlannedPartition, PlannedVolume};
    use crate::proposal::settings::{ProposalSettings, VolumeSpec};
    use assert_matches::assert_matches;

    const MIB_BLOCKS: u64 = 2048;

    fn space(disk: &str, size: DiskSize) -> FreeDiskSpace {
        FreeDiskSpace {
            owner: SpaceOwner::Disk(disk.into()),
            region: Region::new(MIB_BLOCKS, size.to_bytes() / 512, 512),
            kind: SpaceKind::Primary,
            grain: DiskSize::mib(1),
            slots: 128,
            new_table: None,
        }
    }

    fn device(id: &str, min: DiskSize, max: DiskSize, weight: u32) -> PlannedDevice {
        PlannedDevice::Partition(PlannedPartition {
            volume: PlannedVolume::new(id, min, max, weight),
            filesystem: FilesystemType::Ext4,
            mount_point: id.to_string(),
            partition_id: PartitionId::Linux,
            encrypt: false,
        })
    }

    fn restricted(mut device: PlannedDevice, disk: &str) -> PlannedDevice {
        if let PlannedDevice::Partition(p) = &mut device {
            p.volume.disk = Some(disk.to_string());
        }
        device
    }

    fn optional(mut device: PlannedDevice) -> PlannedDevice {
        if let PlannedDevice::Partition(p) = &mut device {
            p.volume.optional = true;
        }
        device
    }

    fn set(devices: Vec<PlannedDevice>) -> PlannedDeviceSet {
        PlannedDeviceSet::from_devices(SizingTarget::Desired, devices)
    }

    fn scenario_a_devices() -> PlannedDeviceSet {
        set(vec![
            device("/", DiskSize::gib(10), DiskSize::gib(50), 2),
            device("swap", DiskSize::gib(2), DiskSize::gib(2), 0),
            device("/home", DiskSize::gib(5), DiskSize::UNLIMITED, 1),
        ])
    }

    fn assert_fits(distribution: &PartitionsDistribution) {
        for space in distribution.spaces() {
            assert!(space.required_size() <= space.space.usable_size(), "{}", space);
        }
    }

    #[test]
    fn test_scenario_fewer_regions_and_weighted_growth() {
        let spaces = vec![
            space("/dev/sda", DiskSize::gib(100)),
            space("/dev/sdb", DiskSize::gib(20)),
        ];
        let solved = SpaceDistributionSolver::default()
            .solve(&spaces, &scenario_a_devices())
            .unwrap();
        let distribution = solved.distribution;

        assert_eq!(distribution.regions_used(), 1);
        assert_eq!(distribution.spaces()[0].space.disk_name(), Some("/dev/sda"));
        assert_eq!(distribution.size_of("/"), Some(DiskSize::gib(50)));
        assert_eq!(distribution.size_of("swap"), Some(DiskSize::gib(2)));
        assert_eq!(distribution.size_of("/home"), Some(DiskSize::gib(48)));
        assert_eq!(distribution.wasted(), DiskSize::ZERO);
        assert_fits(&distribution);
    }

    #[test]
    fn test_scenario_target_fallback_leaves_unused_space() {
        let spaces = vec![space("/dev/sda", DiskSize::gib(8))];
        let settings = ProposalSettings::new(
            &["/dev/sda"],
            vec![VolumeSpec::new("/", FilesystemType::Xfs).sizes(
                DiskSize::gib(6),
                DiskSize::gib(10),
                DiskSize::UNLIMITED,
            )],
        );
        let solver = SpaceDistributionSolver::default();

        let desired = PlannedDeviceSet::build(&settings, SizingTarget::Desired).unwrap();
        let err = solver.solve(&spaces, &desired).unwrap_err();
        assert_matches!(err, Error::NoDiskSpace { ref target, .. } if target == "desired");

        let min = PlannedDeviceSet::build(&settings, SizingTarget::Min).unwrap();
        let distribution = solver.solve(&spaces, &min).unwrap().distribution;
        assert_eq!(distribution.size_of("/"), Some(DiskSize::gib(6)));
        assert_eq!(distribution.wasted(), DiskSize::gib(2));
    }

    #[test]
    fn test_scenario_restriction_is_hard() {
        let spaces = vec![
            space("/dev/sda", DiskSize::gib(200)),
            space("/dev/sdb", DiskSize::gib(5)),
        ];
        let planned = set(vec![restricted(
            device("/data", DiskSize::gib(10), DiskSize::UNLIMITED, 1),
            "/dev/sdb",
        )]);
        let err = SpaceDistributionSolver::default()
            .solve(&spaces, &planned)
            .unwrap_err();
        assert_matches!(err, Error::NoDiskSpace { .. });
    }

    #[test]
    fn test_restricted_device_lands_on_its_disk() {
        let spaces = vec![
            space("/dev/sda", DiskSize::gib(200)),
            space("/dev/sdb", DiskSize::gib(20)),
        ];
        let planned = set(vec![
            device("/", DiskSize::gib(10), DiskSize::gib(20), 1),
            restricted(device("/data", DiskSize::gib(10), DiskSize::UNLIMITED, 1), "/dev/sdb"),
        ]);
        let distribution = SpaceDistributionSolver::default()
            .solve(&spaces, &planned)
            .unwrap()
            .distribution;
        assert_eq!(
            distribution.space_of("/data").unwrap().space.disk_name(),
            Some("/dev/sdb")
        );
        assert_fits(&distribution);
    }

    #[test]
    fn test_empty_catalogue_is_no_disk_space() {
        let err = SpaceDistributionSolver::default()
            .solve(&[], &scenario_a_devices())
            .unwrap_err();
        assert!(err.is_retryable());
        assert_matches!(err, Error::NoDiskSpace { .. });
    }

    #[test]
    fn test_deterministic() {
        let spaces = vec![
            space("/dev/sda", DiskSize::gib(30)),
            space("/dev/sdb", DiskSize::gib(30)),
            space("/dev/sdc", DiskSize::gib(12)),
        ];
        let planned = set(vec![
            device("/", DiskSize::gib(20), DiskSize::gib(25), 1),
            device("/var", DiskSize::gib(15), DiskSize::gib(25), 1),
            device("swap", DiskSize::gib(4), DiskSize::gib(4), 0),
            device("/home", DiskSize::gib(10), DiskSize::UNLIMITED, 3),
        ]);
        let solver = SpaceDistributionSolver::default();
        let first = solver.solve(&spaces, &planned).unwrap();
        let second = solver.solve(&spaces, &planned).unwrap();

        assert_eq!(first.distribution, second.distribution);
        assert_eq!(first.branches, second.branches);
        assert_eq!(first.distribution.device_count(), 4);
        assert_fits(&first.distribution);
    }

    #[test]
    fn test_optional_devices_never_displace_mandatory() {
        let spaces = vec![space("/dev/sda", DiskSize::gib(10))];
        let planned = set(vec![
            device("/", DiskSize::gib(8), DiskSize::UNLIMITED, 1),
            optional(device("/srv", DiskSize::gib(4), DiskSize::gib(4), 0)),
            optional(device("/tmp", DiskSize::gib(1), DiskSize::gib(1), 0)),
        ]);
        let distribution = SpaceDistributionSolver::default()
            .solve(&spaces, &planned)
            .unwrap()
            .distribution;

        assert!(!distribution.contains("/srv"));
        assert_eq!(distribution.size_of("/tmp"), Some(DiskSize::gib(1)));
        assert_eq!(distribution.size_of("/"), Some(DiskSize::gib(9)));
    }

    #[test]
    fn test_disk_preference_breaks_ties() {
        let spaces = vec![
            space("/dev/sda", DiskSize::gib(20)),
            space("/dev/sdb", DiskSize::gib(20)),
        ];
        let planned = set(vec![device("/", DiskSize::gib(5), DiskSize::gib(5), 0)]);
        let order = vec!["/dev/sdb".to_string(), "/dev/sda".to_string()];
        let distribution = SpaceDistributionSolver::default()
            .with_disk_order(&order)
            .solve(&spaces, &planned)
            .unwrap()
            .distribution;
        assert_eq!(distribution.spaces()[0].space.disk_name(), Some("/dev/sdb"));
    }

    #[test]
    fn test_weighted_policy_honours_preference_penalty() {
        let spaces = vec![
            space("/dev/sda", DiskSize::gib(20)),
            space("/dev/sdb", DiskSize::gib(30)),
        ];
        let planned = set(vec![device("/", DiskSize::gib(10), DiskSize::gib(10), 0)]);
        let order = vec!["/dev/sdb".to_string(), "/dev/sda".to_string()];

        let lexicographic = SpaceDistributionSolver::default()
            .with_disk_order(&order)
            .solve(&spaces, &planned)
            .unwrap()
            .distribution;
        assert_eq!(lexicographic.spaces()[0].space.disk_name(), Some("/dev/sda"));

        let weighted = SpaceDistributionSolver::new(
            ScoringPolicy::weighted(DiskSize::gib(1), DiskSize::gib(20)),
            SearchBudget::default(),
        )
        .with_disk_order(&order)
        .solve(&spaces, &planned)
        .unwrap()
        .distribution;
        assert_eq!(weighted.spaces()[0].space.disk_name(), Some("/dev/sdb"));
    }

    fn msdos_with_primaries(count: u32) -> Devicegraph {
        let mut disk = Disk::new("/dev/sda", DiskSize::gib(20)).with_partition_table(PartitionTableType::Msdos);
        if let Some(table) = disk.partition_table.as_mut() {
            for number in 1..=count {
                let start = 1 + (number as u64 - 1) * 1024;
                table.partitions.push(Partition::new(
                    format!("/dev/sda{}", number),
                    number,
                    Region::new(start * MIB_BLOCKS, 1024 * MIB_BLOCKS, 512),
                    PartitionKind::Primary,
                    PartitionId::Linux,
                ));
            }
        }
        Devicegraph::new().with_disk(disk)
    }

    #[test]
    fn test_full_msdos_table_reports_slots() {
        let graph = msdos_with_primaries(4);
        let spaces = FreeSpaceScanner::new().scan(&graph, &["/dev/sda".to_string()]);
        assert!(!spaces.is_empty());

        let planned = set(vec![device("/", DiskSize::gib(5), DiskSize::UNLIMITED, 1)]);
        let err = SpaceDistributionSolver::default()
            .solve(&spaces, &planned)
            .unwrap_err();
        assert_matches!(err, Error::NoMorePartitionSlot { .. });
    }

    #[test]
    fn test_last_slot_shared_between_devices() {
        let graph = msdos_with_primaries(3);
        let spaces = FreeSpaceScanner::new().scan(&graph, &["/dev/sda".to_string()]);

        let planned = set(vec![
            device("/", DiskSize::gib(2), DiskSize::UNLIMITED, 1),
            device("/home", DiskSize::gib(2), DiskSize::UNLIMITED, 1),
        ]);
        let err = SpaceDistributionSolver::default()
            .solve(&spaces, &planned)
            .unwrap_err();
        assert_matches!(err, Error::NoMorePartitionSlot { .. });

        let single = set(vec![device("/", DiskSize::gib(2), DiskSize::UNLIMITED, 1)]);
        assert!(SpaceDistributionSolver::default().solve(&spaces, &single).is_ok());
    }

    #[test]
    fn test_exhausted_budget_is_recoverable() {
        let spaces = vec![space("/dev/sda", DiskSize::gib(100))];
        let budget = SearchBudget {
            max_branches: 0,
            ..SearchBudget::default()
        };
        let err = SpaceDistributionSolver::new(ScoringPolicy::default(), budget)
            .solve(&spaces, &scenario_a_devices())
            .unwrap_err();
        assert!(err.is_retryable());
        assert_matches!(err, Error::NoDiskSpace { .. });
    }

    /// First distribution found uses three regions, the best one two
    fn spread_spaces() -> (Vec<FreeDiskSpace>, PlannedDeviceSet) {
        let spaces = vec![
            space("/dev/sda", DiskSize::gib(30)),
            space("/dev/sdb", DiskSize::gib(30)),
            space("/dev/sdc", DiskSize::gib(12)),
        ];
        let planned = set(vec![
            device("/", DiskSize::gib(20), DiskSize::gib(20), 0),
            device("/var", DiskSize::gib(15), DiskSize::gib(15), 0),
            device("/home", DiskSize::gib(10), DiskSize::gib(10), 0),
            device("swap", DiskSize::gib(4), DiskSize::gib(4), 0),
        ]);
        (spaces, planned)
    }

    #[test]
    fn test_no_extra_branches_keeps_first_distribution() {
        let (spaces, planned) = spread_spaces();

        let unbounded = SpaceDistributionSolver::default().solve(&spaces, &planned).unwrap();
        assert_eq!(unbounded.distribution.regions_used(), 2);

        let budget = SearchBudget {
            extra_branches: 0,
            ..SearchBudget::default()
        };
        let first = SpaceDistributionSolver::new(ScoringPolicy::default(), budget)
            .solve(&spaces, &planned)
            .unwrap();
        assert_eq!(first.distribution.regions_used(), 3);
        assert_eq!(first.distribution.device_count(), 4);
        assert_eq!(first.distribution.spaces()[2].space.disk_name(), Some("/dev/sdc"));
        assert!(first.branches < unbounded.branches);
        assert_fits(&first.distribution);
    }

    #[test]
    fn test_branch_cap_returns_best_so_far() {
        let (spaces, planned) = spread_spaces();
        let budget = SearchBudget {
            max_branches: 6,
            ..SearchBudget::default()
        };
        let solved = SpaceDistributionSolver::new(ScoringPolicy::default(), budget)
            .solve(&spaces, &planned)
            .unwrap();

        assert!(solved.branches <= 6);
        assert_eq!(solved.distribution.device_count(), 4);
        assert!(solved.distribution.regions_used() <= 3);
        assert_fits(&solved.distribution);
    }

    #[test]
    fn test_elapsed_time_limit_is_recoverable() {
        let spaces = vec![space("/dev/sda", DiskSize::gib(100))];
        let budget = SearchBudget {
            time_limit: Some(Duration::ZERO),
            ..SearchBudget::default()
        };
        let err = SpaceDistributionSolver::new(ScoringPolicy::default(), budget)
            .solve(&spaces, &scenario_a_devices())
            .unwrap_err();
        assert!(err.is_retryable());
        assert_matches!(err, Error::NoDiskSpace { .. });
    }

    #[test]
    fn test_min_target_never_needs_more_than_desired() {
        let spaces = vec![space("/dev/sda", DiskSize::gib(60))];
        let settings = ProposalSettings::new(
            &["/dev/sda"],
            vec![
                VolumeSpec::new("/", FilesystemType::Btrfs)
                    .sizes(DiskSize::gib(10), DiskSize::gib(20), DiskSize::gib(40))
                    .weight(1),
                VolumeSpec::new("swap", FilesystemType::Swap).sizes(
                    DiskSize::gib(1),
                    DiskSize::gib(4),
                    DiskSize::gib(4),
                ),
            ],
        );
        let solver = SpaceDistributionSolver::default();
        let desired = PlannedDeviceSet::build(&settings, SizingTarget::Desired).unwrap();
        let min = PlannedDeviceSet::build(&settings, SizingTarget::Min).unwrap();

        assert!(min.required_size() <= desired.required_size());
        assert!(solver.solve(&spaces, &desired).is_ok());
        assert!(solver.solve(&spaces, &min).is_ok());
    }
}
