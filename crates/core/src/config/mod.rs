//! Configuration loading and management.
//!
//! This module provides functionality to load, validate and resolve the
//! provisioning configuration from `repo-runner.toml`.

pub mod error;
pub mod loader;
pub mod models;
