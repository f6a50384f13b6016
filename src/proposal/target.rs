//! Sizing Targets
//!
//! A target decides which lower size bound governs one proposal attempt.
//! The ladder lists the targets tried in order.

use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sizing strategy of one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SizingTarget {
    /// Volumes start at their desired size
    Desired,
    /// Volumes start at their minimum size
    Min,
}

impl fmt::Display for SizingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizingTarget::Desired => write!(f, "desired"),
            SizingTarget::Min => write!(f, "min"),
        }
    }
}

impl FromStr for SizingTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "desired" => Ok(SizingTarget::Desired),
            "min" | "minimum" => Ok(SizingTarget::Min),
            other => Err(Error::Configuration(format!("unknown sizing target: {}", other))),
        }
    }
}

/// Ordered list of targets tried by the retry controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TargetLadder(Vec<SizingTarget>);

impl Default for TargetLadder {
    fn default() -> Self {
        Self(vec![SizingTarget::Desired, SizingTarget::Min])
    }
}

impl TargetLadder {
    pub fn new(targets: Vec<SizingTarget>) -> Result<Self> {
        let ladder = Self(targets);
        ladder.validate()?;
        Ok(ladder)
    }

    /// Ladder that starts (and ends) at a single target
    pub fn single(target: SizingTarget) -> Self {
        Self(vec![target])
    }

    pub fn targets(&self) -> &[SizingTarget] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<SizingTarget> {
        self.0.get(index).copied()
    }

    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(Error::Configuration("target ladder is empty".into()));
        }
        Ok(())
    }
}
