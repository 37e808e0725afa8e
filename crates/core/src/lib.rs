//! # rr-core
//!
//! Core provisioning engine for repo-runner.
//!
//! This crate provides:
//! - Configuration loading from `repo-runner.toml`
//! - A platform abstraction for running and spawning tools
//! - Source acquisition, environment building and process supervision
//! - The ten-stage pipeline engine and its run state
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`platform`]: OS-specific mechanics behind one trait
//! - [`fallback`]: Ordered fallback ladders
//! - [`acquisition`]: Shallow clone with archive download fallback
//! - [`environment`]: Tier environments and dependency installs
//! - [`supervisor`]: Server processes, output relay, readiness polling
//! - [`progress`]: Progress stream to the observer
//! - [`scaffold`]: Embedded manifests and launcher scripts
//! - [`state`]: Run context, shared status and the run manager
//! - [`engine`]: Pipeline execution engine
//! - [`doctor`]: Pre-flight diagnostics

pub mod acquisition;
pub mod config;
pub mod doctor;
pub mod engine;
pub mod environment;
pub mod fallback;
pub mod platform;
pub mod progress;
pub mod scaffold;
pub mod state;
pub mod supervisor;
