//! Test infrastructure for the L3 gateway-mode extension
//!
//! Provides:
//! - Router, port and gateway-payload fixtures
//! - A seeded in-memory test environment
//! - Store and rendered-view verification helpers

pub mod fixtures;
mod verification;

pub use fixtures::*;
pub use verification::*;
