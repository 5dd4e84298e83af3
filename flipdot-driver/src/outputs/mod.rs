//! Digital output providers
//!
//! Concrete [`OutputProvider`](crate::power::OutputProvider) implementations
//! for the platforms the driver runs on.

pub mod sysfs;

pub use sysfs::{SysfsOutput, SysfsOutputProvider};
