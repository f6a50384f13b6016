//! Regions
//!
//! A contiguous range of blocks on a disk or volume group.

use super::size::DiskSize;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Contiguous block range. `start` and `length` are counted in blocks of
/// `block_size` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Region {
    pub start: u64,
    pub length: u64,
    pub block_size: u64,
}

impl Region {
    pub fn new(start: u64, length: u64, block_size: u64) -> Self {
        Self {
            start,
            length,
            block_size: block_size.max(1),
        }
    }

    /// Build a region from byte offsets, rounding the start up and the end down
    /// to whole blocks
    pub fn from_bytes(start: DiskSize, size: DiskSize, block_size: u64) -> Self {
        let block_size = block_size.max(1);
        let start_blocks = start.to_bytes().div_ceil(block_size);
        let end_blocks = (start + size).to_bytes() / block_size;
        Self::new(start_blocks, end_blocks.saturating_sub(start_blocks), block_size)
    }

    /// Last block of the region, `None` for an empty region
    pub fn end(&self) -> Option<u64> {
        if self.is_empty() {
            return None;
        }
        Some(self.start.saturating_add(self.length - 1))
    }

    /// First block past the region
    pub fn end_exclusive(&self) -> u64 {
        self.start.saturating_add(self.length)
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn size(&self) -> DiskSize {
        DiskSize::b(self.length.saturating_mul(self.block_size))
    }

    pub fn start_byte(&self) -> DiskSize {
        DiskSize::b(self.start.saturating_mul(self.block_size))
    }

    pub fn end_byte(&self) -> DiskSize {
        DiskSize::b(self.end_exclusive().saturating_mul(self.block_size))
    }

    /// Whether `other` lies completely inside this region
    pub fn contains(&self, other: &Region) -> bool {
        other.start_byte() >= self.start_byte() && other.end_byte() <= self.end_byte()
    }

    pub fn overlaps(&self, other: &Region) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.start_byte() < other.end_byte()
            && other.start_byte() < self.end_byte()
    }

    /// Number of blocks needed to hold `size`
    pub fn blocks_for(&self, size: DiskSize) -> u64 {
        size.to_bytes().div_ceil(self.block_size)
    }

    /// Shrink the region so that both ends fall on `grain` boundaries
    pub fn aligned(&self, grain: DiskSize) -> Region {
        let grain_blocks = (grain.to_bytes() / self.block_size).max(1);
        let start = self.start.div_ceil(grain_blocks).saturating_mul(grain_blocks);
        let end = (self.end_exclusive() / grain_blocks) * grain_blocks;
        Region::new(start, end.saturating_sub(start), self.block_size)
    }

    /// Region of `size` bytes starting `offset` bytes into this one, clipped to it
    pub fn sub_region(&self, offset: DiskSize, size: DiskSize) -> Region {
        let start = self.start.saturating_add(self.blocks_for(offset)).min(self.end_exclusive());
        let length = self
            .blocks_for(size)
            .min(self.end_exclusive() - start);
        Region::new(start, length, self.block_size)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {} B]",
            self.start, self.length, self.block_size
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_basics() {
        let region = Region::new(2048, 4096, 512);
        assert_eq!(region.end(), Some(6143));
        assert_eq!(region.size(), DiskSize::mib(2));
        assert_eq!(region.start_byte(), DiskSize::mib(1));
        assert!(!region.is_empty());
        assert!(Region::new(10, 0, 512).is_empty());
    }

    #[test]
    fn test_empty_and_malformed_regions() {
        assert_eq!(Region::new(0, 0, 512).end(), None);
        assert_eq!(Region::new(4096, 0, 512).end(), None);
        assert_eq!(Region::new(7, 1, 512).end(), Some(7));

        let json = r#"{"start": 18446744073709551615, "length": 10, "block_size": 512}"#;
        let region: Region = serde_json::from_str(json).unwrap();
        assert_eq!(region.end_exclusive(), u64::MAX);
        assert_eq!(region.end(), Some(u64::MAX));
        assert!(!region.contains(&Region::new(0, 1, 512)));
    }

    #[test]
    fn test_region_alignment() {
        let grain = DiskSize::mib(1);
        let region = Region::new(34, 2048 * 10, 512);
        let aligned = region.aligned(grain);
        assert_eq!(aligned.start, 2048);
        assert_eq!(aligned.end_exclusive(), 2048 * 10);
        assert_eq!(aligned.size(), DiskSize::mib(9));

        let tiny = Region::new(100, 200, 512).aligned(grain);
        assert!(tiny.is_empty());
    }

    #[test]
    fn test_sub_region() {
        let region = Region::new(2048, 2048 * 100, 512);
        let sub = region.sub_region(DiskSize::mib(10), DiskSize::mib(20));
        assert_eq!(sub.start, 2048 + 2048 * 10);
        assert_eq!(sub.size(), DiskSize::mib(20));
        assert!(region.contains(&sub));

        let clipped = region.sub_region(DiskSize::mib(90), DiskSize::mib(20));
        assert_eq!(clipped.size(), DiskSize::mib(10));
    }

    #[test]
    fn test_overlaps() {
        let a = Region::new(0, 100, 512);
        let b = Region::new(99, 10, 512);
        let c = Region::new(100, 10, 512);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_from_bytes() {
        let region = Region::from_bytes(DiskSize::mib(1), DiskSize::mib(3), 4096);
        assert_eq!(region.start, 256);
        assert_eq!(region.length, 768);
    }
}
