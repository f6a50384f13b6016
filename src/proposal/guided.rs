//! Guided Proposal
//!
//! Entry point tying the pieces together. A proposal validates the
//! settings, lets the space maker free room on a copy of the graph, walks
//! the target ladder, commits the winning distribution and finally checks
//! bootability. The caller's graph is never modified.

use super::boot::NoopBootValidator;
use super::controller::TargetRetryController;
use super::distribution::{PartitionsDistribution, ScoringPolicy, SearchBudget};
use super::metrics::ProposalMetrics;
use super::mutator::GraphMutator;
use super::settings::ProposalSettings;
use super::space_maker::ResizeSpaceMaker;
use super::target::{SizingTarget, TargetLadder};
use crate::config::ProposalConfig;
use crate::devicegraph::Devicegraph;
use crate::domain::{BootValidator, CreatedDevice, DevicegraphMutator, SpaceMaker};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

/// Outcome of a successful proposal
#[derive(Debug, Clone, Serialize)]
pub struct Proposal {
    /// Staging graph holding the new devices
    pub devicegraph: Devicegraph,
    /// Target the winning attempt was sized for
    pub target: SizingTarget,
    pub distribution: PartitionsDistribution,
    pub created: Vec<CreatedDevice>,
    pub proposed_at: DateTime<Utc>,
}

/// Guided storage proposal with pluggable collaborators
pub struct GuidedProposal {
    settings: ProposalSettings,
    ladder: TargetLadder,
    policy: ScoringPolicy,
    budget: SearchBudget,
    space_maker: Arc<dyn SpaceMaker>,
    mutator: Arc<dyn DevicegraphMutator>,
    boot_validator: Arc<dyn BootValidator>,
    metrics: Option<Arc<ProposalMetrics>>,
}

impl std::fmt::Debug for GuidedProposal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuidedProposal")
            .field("settings", &self.settings)
            .field("ladder", &self.ladder)
            .field("policy", &self.policy)
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

impl GuidedProposal {
    /// Proposal with the default ladder, policy and collaborators
    pub fn new(settings: ProposalSettings) -> Self {
        Self {
            settings,
            ladder: TargetLadder::default(),
            policy: ScoringPolicy::default(),
            budget: SearchBudget::default(),
            space_maker: Arc::new(ResizeSpaceMaker::new()),
            mutator: Arc::new(GraphMutator::new()),
            boot_validator: Arc::new(NoopBootValidator),
            metrics: None,
        }
    }

    pub fn from_config(config: &ProposalConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config.settings.clone())
            .with_ladder(config.ladder.clone())
            .with_policy(config.scoring)
            .with_budget(config.solver.budget()))
    }

    pub fn with_ladder(mut self, ladder: TargetLadder) -> Self {
        self.ladder = ladder;
        self
    }

    pub fn with_policy(mut self, policy: ScoringPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_budget(mut self, budget: SearchBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_space_maker(mut self, space_maker: Arc<dyn SpaceMaker>) -> Self {
        self.space_maker = space_maker;
        self
    }

    pub fn with_mutator(mut self, mutator: Arc<dyn DevicegraphMutator>) -> Self {
        self.mutator = mutator;
        self
    }

    pub fn with_boot_validator(mut self, validator: Arc<dyn BootValidator>) -> Self {
        self.boot_validator = validator;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<ProposalMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn settings(&self) -> &ProposalSettings {
        &self.settings
    }

    /// Compute a proposal for `graph`
    #[instrument(skip_all, fields(disks = self.settings.candidate_disks.len(), volumes = self.settings.volumes.len()))]
    pub fn propose(&self, graph: &Devicegraph) -> Result<Proposal> {
        let started = Instant::now();
        self.settings.validate()?;
        self.ladder.validate()?;

        let mut staging = self.space_maker.make_space(graph, &self.settings)?;

        let mut controller =
            TargetRetryController::for_settings(&self.settings, self.ladder.clone(), self.policy, self.budget);
        if let Some(metrics) = &self.metrics {
            controller = controller.with_metrics(metrics.clone());
        }
        let attempt = controller.run(&staging, &self.settings)?;

        let created = self
            .mutator
            .materialize(&mut staging, &attempt.planned, &attempt.distribution, &self.settings)?;
        self.boot_validator.validate(&staging, &attempt.distribution)?;

        let elapsed = started.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.observe_duration(elapsed.as_secs_f64());
        }
        info!(
            target = %attempt.target,
            created = created.len(),
            regions = attempt.distribution.regions_used(),
            elapsed_ms = elapsed.as_millis() as u64,
            "proposal ready"
        );

        Ok(Proposal {
            devicegraph: staging,
            target: attempt.target,
            distribution: attempt.distribution,
            created,
            proposed_at: Utc::now(),
        })
    }
}
