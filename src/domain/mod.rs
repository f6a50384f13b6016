//! Domain layer - Value types and port definitions
//!
//! Sizes and block regions used across the crate, plus the traits (ports)
//! the proposal uses to reach its collaborators.

pub mod ports;
pub mod region;
pub mod size;

pub use ports::*;
pub use region::Region;
pub use size::DiskSize;
