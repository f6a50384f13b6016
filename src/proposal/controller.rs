//! Target Retry Controller
//!
//! Drives the solver across the sizing target ladder. Every attempt scans
//! the graph and plans the devices afresh; a retryable failure moves on to
//! the next target, anything else stops the ladder.

use super::distribution::{PartitionsDistribution, ScoringPolicy, SearchBudget, SpaceDistributionSolver};
use super::free_space::{FreeDiskSpace, FreeSpaceScanner};
use super::metrics::{outcome_label, ProposalMetrics};
use super::planned::PlannedDeviceSet;
use super::settings::ProposalSettings;
use super::target::{SizingTarget, TargetLadder};
use crate::devicegraph::Devicegraph;
use crate::error::{Error, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

// =============================================================================
// Attempt Result
// =============================================================================

/// Winning attempt of a ladder run
#[derive(Debug, Clone)]
pub struct ProposedAttempt {
    pub target: SizingTarget,
    pub planned: PlannedDeviceSet,
    pub spaces: Vec<FreeDiskSpace>,
    pub distribution: PartitionsDistribution,
    pub branches: u64,
}

/// State of the controller
#[derive(Debug)]
pub enum ControllerState {
    /// Next attempt uses the ladder entry at this index
    Attempting(usize),
    Proposed(Box<ProposedAttempt>),
    /// Holds the error of the last attempt
    Failed(Error),
}

impl ControllerState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ControllerState::Attempting(_))
    }
}

// =============================================================================
// Controller
// =============================================================================

#[derive(Debug)]
pub struct TargetRetryController {
    ladder: TargetLadder,
    scanner: FreeSpaceScanner,
    solver: SpaceDistributionSolver,
    metrics: Option<Arc<ProposalMetrics>>,
    state: ControllerState,
}

impl TargetRetryController {
    pub fn new(ladder: TargetLadder, scanner: FreeSpaceScanner, solver: SpaceDistributionSolver) -> Self {
        Self {
            ladder,
            scanner,
            solver,
            metrics: None,
            state: ControllerState::Attempting(0),
        }
    }

    /// Controller wired to the scanner options and disk preference of `settings`
    pub fn for_settings(
        settings: &ProposalSettings,
        ladder: TargetLadder,
        policy: ScoringPolicy,
        budget: SearchBudget,
    ) -> Self {
        let scanner = FreeSpaceScanner::new()
            .skip_removable(settings.skip_removable)
            .default_table(settings.default_partition_table);
        let solver = SpaceDistributionSolver::new(policy, budget).with_disk_order(&settings.candidate_disks);
        Self::new(ladder, scanner, solver)
    }

    pub fn with_metrics(mut self, metrics: Arc<ProposalMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn ladder(&self) -> &TargetLadder {
        &self.ladder
    }

    /// Run one attempt and advance the state
    pub fn step(&mut self, graph: &Devicegraph, settings: &ProposalSettings) -> &ControllerState {
        let index = match self.state {
            ControllerState::Attempting(index) => index,
            _ => return &self.state,
        };
        let target = match self.ladder.get(index) {
            Some(target) => target,
            None => {
                self.state = ControllerState::Failed(Error::Configuration("target ladder is empty".into()));
                return &self.state;
            }
        };

        let result = self.attempt(target, graph, settings);
        if let Some(metrics) = &self.metrics {
            metrics.record_attempt(&target.to_string(), outcome_label(result.as_ref().err()));
            if let Ok(proposed) = &result {
                metrics.observe_branches(proposed.branches);
            }
        }

        self.state = match result {
            Ok(proposed) => {
                info!(%target, devices = proposed.distribution.device_count(), "proposal attempt succeeded");
                ControllerState::Proposed(Box::new(proposed))
            }
            Err(err) if err.is_retryable() && index + 1 < self.ladder.len() => {
                warn!(%target, error = %err, "proposal attempt failed, trying next target");
                ControllerState::Attempting(index + 1)
            }
            Err(err) => {
                warn!(%target, error = %err, "proposal failed");
                ControllerState::Failed(err)
            }
        };
        &self.state
    }

    /// Walk the ladder until an attempt succeeds or the ladder is exhausted
    pub fn run(mut self, graph: &Devicegraph, settings: &ProposalSettings) -> Result<ProposedAttempt> {
        while !self.state.is_terminal() {
            self.step(graph, settings);
        }
        match self.state {
            ControllerState::Proposed(proposed) => Ok(*proposed),
            ControllerState::Failed(err) => Err(err),
            ControllerState::Attempting(_) => Err(Error::Proposal("controller stopped early".into())),
        }
    }

    /// One independent attempt for `target`
    pub fn attempt(
        &self,
        target: SizingTarget,
        graph: &Devicegraph,
        settings: &ProposalSettings,
    ) -> Result<ProposedAttempt> {
        let started = Instant::now();
        let spaces = self.scanner.scan(graph, &settings.candidate_disks);
        let planned = PlannedDeviceSet::build(settings, target)?;
        let solved = self.solver.solve(&spaces, &planned)?;

        debug!(
            %target,
            branches = solved.branches,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "attempt solved"
        );
        Ok(ProposedAttempt {
            target,
            planned,
            spaces,
            distribution: solved.distribution,
            branches: solved.branches,
        })
    }
}
