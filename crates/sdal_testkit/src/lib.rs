//! # SDAL Testkit
//!
//! Shared test utilities for the SDAL workspace.
//!
//! This crate provides:
//! - Deterministic fixtures (regions, configs, payloads) used by unit,
//!   integration, and benchmark code
//! - Property-based generators built on proptest
//!
//! Everything here is deterministic: fixtures use a fixed seed so the
//! byte-identity tests elsewhere in the workspace stay meaningful.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::fixtures::{sample_region, skewed_payload, small_config, three_road_region};
    pub use crate::generators::{coordinate_strategy, region_strategy, road_strategy};
}
