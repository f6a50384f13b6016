//! Proposal Configuration
//!
//! File based configuration of a proposal run: the settings, the target
//! ladder, the solver limits and the scoring policy. Files are YAML
//! (`.yaml`/`.yml`) or JSON (`.json`).

use crate::error::{Error, Result};
use crate::proposal::distribution::{ScoringPolicy, SearchBudget};
use crate::proposal::settings::ProposalSettings;
use crate::proposal::target::TargetLadder;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

// =============================================================================
// Solver Configuration
// =============================================================================

/// Limits of the distribution search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SolverConfig {
    /// Placement attempts before the search gives up
    pub max_branches: u64,
    /// Placement attempts allowed once a first distribution was found
    pub extra_branches: u64,
    /// Wall clock limit of one search in milliseconds
    pub time_limit_ms: Option<u64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        let budget = SearchBudget::default();
        Self {
            max_branches: budget.max_branches,
            extra_branches: budget.extra_branches,
            time_limit_ms: None,
        }
    }
}

impl SolverConfig {
    pub fn budget(&self) -> SearchBudget {
        SearchBudget {
            max_branches: self.max_branches,
            extra_branches: self.extra_branches,
            time_limit: self.time_limit_ms.map(Duration::from_millis),
        }
    }
}

// =============================================================================
// Proposal Configuration
// =============================================================================

/// Complete configuration of a proposal run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ProposalConfig {
    pub settings: ProposalSettings,
    /// Sizing targets, tried in order
    pub ladder: TargetLadder,
    pub solver: SolverConfig,
    pub scoring: ScoringPolicy,
}

impl ProposalConfig {
    /// Load a configuration file, picking the format from the extension
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await?;
        let config = Self::parse(&text, path)?;
        debug!(path = %path.display(), volumes = config.settings.volumes.len(), "loaded configuration");
        Ok(config)
    }

    fn parse(text: &str, path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(serde_json::from_str(text)?),
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(text)?),
            other => Err(Error::Configuration(format!(
                "unsupported configuration format {:?} for {}",
                other.unwrap_or(""),
                path.display()
            ))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.settings.validate()?;
        self.ladder.validate()?;
        if self.solver.max_branches == 0 {
            return Err(Error::Configuration("solver.max_branches must be positive".into()));
        }
        if self.solver.time_limit_ms == Some(0) {
            return Err(Error::Configuration("solver.time_limit_ms must be positive".into()));
        }
        Ok(())
    }

    /// JSON schema of the configuration file
    pub fn json_schema() -> Result<String> {
        let schema = schemars::schema_for!(ProposalConfig);
        Ok(serde_json::to_string_pretty(&schema)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devicegraph::FilesystemType;
    use crate::domain::DiskSize;
    use crate::proposal::distribution::ScoringStrategy;
    use crate::proposal::target::SizingTarget;
    use assert_matches::assert_matches;
    use std::io::Write;

    const YAML: &str = r#"
settings:
  candidate_disks: [/dev/sda, /dev/sdb]
  use_lvm: true
  volumes:
    - mount_point: /
      filesystem: btrfs
      min_size: 5 GiB
      desired_size: 10 GiB
      max_size: 50GiB
      weight: 40
      subvolumes: ["@/var"]
    - mount_point: swap
      filesystem: swap
      min_size: 2 GiB
      desired_size: 2 GiB
      max_size: 2 GiB
ladder: [desired, min]
solver:
  max_branches: 5000
  time_limit_ms: 250
scoring:
  strategy: weighted
"#;

    fn write_temp(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_load_yaml() {
        let file = write_temp(".yaml", YAML);
        let config = ProposalConfig::load(file.path()).await.unwrap();

        assert_eq!(config.settings.candidate_disks.len(), 2);
        assert!(config.settings.use_lvm);
        assert_eq!(config.settings.lvm_vg_name, "system");

        let root = &config.settings.volumes[0];
        assert_eq!(root.filesystem, FilesystemType::Btrfs);
        assert_eq!(root.max_size, DiskSize::gib(50));
        assert_eq!(root.subvolumes, vec!["@/var"]);

        assert_eq!(config.ladder.targets(), &[SizingTarget::Desired, SizingTarget::Min]);
        assert_eq!(config.scoring.strategy, ScoringStrategy::Weighted);

        let budget = config.solver.budget();
        assert_eq!(budget.max_branches, 5000);
        assert_eq!(budget.extra_branches, SearchBudget::default().extra_branches);
        assert_eq!(budget.time_limit, Some(Duration::from_millis(250)));
        config.validate().unwrap();
    }

    #[tokio::test]
    async fn test_load_json_defaults() {
        let json = r#"{"settings": {"candidate_disks": ["/dev/vda"],
            "volumes": [{"mount_point": "/", "filesystem": "xfs", "min_size": 4294967296,
                         "desired_size": "8 GiB"}]}}"#;
        let file = write_temp(".json", json);
        let config = ProposalConfig::load(file.path()).await.unwrap();

        assert_eq!(config.ladder, TargetLadder::default());
        assert_eq!(config.scoring, ScoringPolicy::default());
        assert_eq!(config.solver, SolverConfig::default());
        assert_eq!(config.settings.volumes[0].min_size, DiskSize::gib(4));
        assert_eq!(config.settings.volumes[0].max_size, DiskSize::UNLIMITED);
    }

    #[tokio::test]
    async fn test_unknown_extension_rejected() {
        let file = write_temp(".toml", "settings = {}");
        let err = ProposalConfig::load(file.path()).await.unwrap_err();
        assert_matches!(err, Error::Configuration(_));
    }

    #[test]
    fn test_missing_file() {
        let err = tokio_test::block_on(ProposalConfig::load("/nonexistent/proposal.yaml")).unwrap_err();
        assert_matches!(err, Error::Io(_));
    }

    #[test]
    fn test_validate_rejects_empty_ladder() {
        let mut config: ProposalConfig = serde_yaml::from_str(YAML).unwrap();
        config.ladder = serde_yaml::from_str("[]").unwrap();
        assert_matches!(config.validate(), Err(Error::Configuration(_)));
    }

    #[test]
    fn test_schema_mentions_settings() {
        let schema = ProposalConfig::json_schema().unwrap();
        assert!(schema.contains("candidate_disks"));
        assert!(schema.contains("SolverConfig"));
    }
}
