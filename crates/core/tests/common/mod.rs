//! Common test utilities for the pipeline integration tests.
//!
//! This module provides shared functionality across the integration tests:
//! - Fixtures (configs, simulated repositories, scripted platforms)
//! - Custom assertions over runs and progress lines

pub mod assertions;
pub mod fixtures;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use fixtures::*;
