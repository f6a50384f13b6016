//! Disk Sizes
//!
//! Byte-exact size type used throughout the proposal. Sizes saturate instead
//! of overflowing and `DiskSize::UNLIMITED` absorbs any addition.

use crate::error::{Error, Result};
use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;

// =============================================================================
// Units
// =============================================================================

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;
pub const TIB: u64 = 1024 * GIB;

const BINARY_UNITS: [(&str, u64); 4] = [("TiB", TIB), ("GiB", GIB), ("MiB", MIB), ("KiB", KIB)];

// =============================================================================
// Disk Size
// =============================================================================

/// A size in bytes, possibly unlimited
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DiskSize(u64);

impl DiskSize {
    pub const ZERO: DiskSize = DiskSize(0);
    pub const UNLIMITED: DiskSize = DiskSize(u64::MAX);

    pub const fn b(bytes: u64) -> Self {
        DiskSize(bytes)
    }

    pub const fn kib(n: u64) -> Self {
        DiskSize(n.saturating_mul(KIB))
    }

    pub const fn mib(n: u64) -> Self {
        DiskSize(n.saturating_mul(MIB))
    }

    pub const fn gib(n: u64) -> Self {
        DiskSize(n.saturating_mul(GIB))
    }

    pub const fn tib(n: u64) -> Self {
        DiskSize(n.saturating_mul(TIB))
    }

    /// Raw number of bytes (`u64::MAX` when unlimited)
    pub const fn to_bytes(self) -> u64 {
        self.0
    }

    pub const fn is_unlimited(self) -> bool {
        self.0 == u64::MAX
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Round up to the next multiple of `grain`
    pub fn align_up(self, grain: DiskSize) -> DiskSize {
        if self.is_unlimited() || grain.0 <= 1 {
            return self;
        }
        let rest = self.0 % grain.0;
        if rest == 0 {
            self
        } else {
            DiskSize(self.0.saturating_add(grain.0 - rest))
        }
    }

    /// Round down to the previous multiple of `grain`
    pub fn align_down(self, grain: DiskSize) -> DiskSize {
        if self.is_unlimited() || grain.0 <= 1 {
            return self;
        }
        DiskSize(self.0 - self.0 % grain.0)
    }

    /// Multiply by `numerator / denominator` without intermediate overflow
    pub fn scale(self, numerator: u64, denominator: u64) -> DiskSize {
        if denominator == 0 || self.is_unlimited() {
            return self;
        }
        let scaled = (self.0 as u128 * numerator as u128) / denominator as u128;
        DiskSize(scaled.min(u64::MAX as u128 - 1) as u64)
    }

    pub fn saturating_sub(self, other: DiskSize) -> DiskSize {
        if self.is_unlimited() {
            return self;
        }
        DiskSize(self.0.saturating_sub(other.0))
    }
}

impl Add for DiskSize {
    type Output = DiskSize;

    fn add(self, rhs: DiskSize) -> DiskSize {
        DiskSize(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for DiskSize {
    fn add_assign(&mut self, rhs: DiskSize) {
        *self = *self + rhs;
    }
}

impl Sub for DiskSize {
    type Output = DiskSize;

    fn sub(self, rhs: DiskSize) -> DiskSize {
        self.saturating_sub(rhs)
    }
}

impl SubAssign for DiskSize {
    fn sub_assign(&mut self, rhs: DiskSize) {
        *self = *self - rhs;
    }
}

impl Sum for DiskSize {
    fn sum<I: Iterator<Item = DiskSize>>(iter: I) -> DiskSize {
        iter.fold(DiskSize::ZERO, |acc, size| acc + size)
    }
}

impl<'a> Sum<&'a DiskSize> for DiskSize {
    fn sum<I: Iterator<Item = &'a DiskSize>>(iter: I) -> DiskSize {
        iter.copied().sum()
    }
}

impl fmt::Display for DiskSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unlimited() {
            return write!(f, "unlimited");
        }
        for (unit, factor) in BINARY_UNITS {
            if self.0 >= factor {
                return write!(f, "{:.2} {}", self.0 as f64 / factor as f64, unit);
            }
        }
        write!(f, "{} B", self.0)
    }
}

impl FromStr for DiskSize {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower == "unlimited" || lower == "max" {
            return Ok(DiskSize::UNLIMITED);
        }

        let split = trimmed
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(trimmed.len());
        let (number, unit) = trimmed.split_at(split);
        if number.is_empty() {
            return Err(Error::InvalidSize(s.to_string()));
        }

        let factor = match unit.trim().to_ascii_lowercase().as_str() {
            "" | "b" => 1,
            "k" | "kib" => KIB,
            "m" | "mib" => MIB,
            "g" | "gib" => GIB,
            "t" | "tib" => TIB,
            "kb" => 1_000,
            "mb" => 1_000_000,
            "gb" => 1_000_000_000,
            "tb" => 1_000_000_000_000,
            _ => return Err(Error::InvalidSize(s.to_string())),
        };

        if number.contains('.') {
            let value: f64 = number
                .parse()
                .map_err(|_| Error::InvalidSize(s.to_string()))?;
            let bytes = value * factor as f64;
            if !bytes.is_finite() || bytes >= u64::MAX as f64 {
                return Err(Error::InvalidSize(s.to_string()));
            }
            Ok(DiskSize(bytes.round() as u64))
        } else {
            let value: u64 = number
                .parse()
                .map_err(|_| Error::InvalidSize(s.to_string()))?;
            value
                .checked_mul(factor)
                .filter(|bytes| *bytes != u64::MAX)
                .map(DiskSize)
                .ok_or_else(|| Error::InvalidSize(s.to_string()))
        }
    }
}

// =============================================================================
// Serialization
// =============================================================================

impl Serialize for DiskSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.is_unlimited() {
            serializer.serialize_str("unlimited")
        } else {
            serializer.serialize_u64(self.0)
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSize {
    Bytes(u64),
    Text(String),
}

impl<'de> Deserialize<'de> for DiskSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match RawSize::deserialize(deserializer)? {
            RawSize::Bytes(bytes) => Ok(DiskSize(bytes)),
            RawSize::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

impl JsonSchema for DiskSize {
    fn schema_name() -> String {
        "DiskSize".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        // Either a byte count or a human readable string such as "10 GiB"
        String::json_schema(gen)
    }
}
