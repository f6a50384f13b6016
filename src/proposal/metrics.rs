//! Proposal Metrics
//!
//! Prometheus counters and histograms describing proposal attempts. The
//! metrics live in their own registry so several proposals (and tests) can
//! run side by side.

use crate::error::{Error, Result};
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};

/// Outcome label of one attempt, `None` meaning success
pub fn outcome_label(error: Option<&Error>) -> &'static str {
    match error {
        None => "proposed",
        Some(Error::NoDiskSpace { .. }) => "no_disk_space",
        Some(Error::NoMorePartitionSlot { .. }) => "no_partition_slot",
        Some(Error::NotBootable(_)) => "not_bootable",
        Some(_) => "error",
    }
}

/// Metrics collected while proposing
#[derive(Clone)]
pub struct ProposalMetrics {
    registry: Registry,
    attempts: IntCounterVec,
    branches: Histogram,
    duration: Histogram,
}

impl std::fmt::Debug for ProposalMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProposalMetrics").finish_non_exhaustive()
    }
}

impl ProposalMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let attempts = IntCounterVec::new(
            Opts::new("proposal_attempts_total", "Proposal attempts by sizing target and outcome"),
            &["target", "outcome"],
        )?;
        let branches = Histogram::with_opts(
            HistogramOpts::new(
                "proposal_solver_branches",
                "Placement branches explored by a successful solver run",
            )
            .buckets(prometheus::exponential_buckets(1.0, 4.0, 10)?),
        )?;
        let duration = Histogram::with_opts(HistogramOpts::new(
            "proposal_duration_seconds",
            "Duration of complete proposals",
        ))?;

        registry.register(Box::new(attempts.clone()))?;
        registry.register(Box::new(branches.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            registry,
            attempts,
            branches,
            duration,
        })
    }

    pub fn record_attempt(&self, target: &str, outcome: &str) {
        self.attempts.with_label_values(&[target, outcome]).inc();
    }

    pub fn observe_branches(&self, branches: u64) {
        self.branches.observe(branches as f64);
    }

    pub fn observe_duration(&self, seconds: f64) {
        self.duration.observe(seconds);
    }

    /// Attempts recorded for `target` with `outcome`
    pub fn attempts(&self, target: &str, outcome: &str) -> u64 {
        self.attempts.with_label_values(&[target, outcome]).get()
    }

    /// Render all metrics in the Prometheus text format
    pub fn gather_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| Error::Proposal(format!("metrics are not UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_gather() {
        let metrics = ProposalMetrics::new().unwrap();
        metrics.record_attempt("desired", "no_disk_space");
        metrics.record_attempt("min", "proposed");
        metrics.observe_branches(12);
        metrics.observe_duration(0.02);

        assert_eq!(metrics.attempts("desired", "no_disk_space"), 1);
        assert_eq!(metrics.attempts("min", "proposed"), 1);

        let text = metrics.gather_text().unwrap();
        assert!(text.contains("proposal_attempts_total"));
        assert!(text.contains("proposal_solver_branches"));
        assert!(text.contains("proposal_duration_seconds"));
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(outcome_label(None), "proposed");
        let err = Error::NoMorePartitionSlot {
            target: "min".into(),
        };
        assert_eq!(outcome_label(Some(&err)), "no_partition_slot");
        assert_eq!(outcome_label(Some(&Error::Proposal("x".into()))), "error");
    }

    #[test]
    fn test_independent_registries() {
        let first = ProposalMetrics::new().unwrap();
        let second = ProposalMetrics::new().unwrap();
        first.record_attempt("min", "proposed");
        assert_eq!(second.attempts("min", "proposed"), 0);
    }
}
