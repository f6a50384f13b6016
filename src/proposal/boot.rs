//! Boot Validators
//!
//! Bootloader placement is decided elsewhere; these validators only check
//! the outcome of a proposal against it.

use super::distribution::PartitionsDistribution;
use crate::devicegraph::{Devicegraph, PartitionId, PartitionTableType};
use crate::domain::BootValidator;
use crate::error::{Error, Result};
use std::collections::BTreeSet;
use tracing::debug;

/// Accepts every proposal
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBootValidator;

impl BootValidator for NoopBootValidator {
    fn validate(&self, _graph: &Devicegraph, _distribution: &PartitionsDistribution) -> Result<()> {
        Ok(())
    }
}

/// Requires an EFI system partition on the GPT disks used by the proposal.
///
/// Passing when at least one of those disks holds an ESP; proposals that
/// touch no GPT disk are not checked.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireEspValidator;

impl BootValidator for RequireEspValidator {
    fn validate(&self, graph: &Devicegraph, distribution: &PartitionsDistribution) -> Result<()> {
        let used: BTreeSet<&str> = distribution
            .spaces()
            .iter()
            .filter_map(|s| s.space.disk_name())
            .collect();

        let mut gpt_disks = Vec::new();
        for name in used {
            let disk = graph.disk(name)?;
            let Some(table) = &disk.partition_table else {
                continue;
            };
            if table.table_type != PartitionTableType::Gpt {
                continue;
            }
            if table.partitions.iter().any(|p| p.id == PartitionId::Esp) {
                debug!(disk = name, "found EFI system partition");
                return Ok(());
            }
            gpt_disks.push(name);
        }

        if gpt_disks.is_empty() {
            return Ok(());
        }
        Err(Error::NotBootable(format!(
            "no EFI system partition on {}",
            gpt_disks.join(", ")
        )))
    }
}
