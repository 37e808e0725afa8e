//! # rr-protocol
//!
//! Core protocol definitions and data models for repo-runner.
//!
//! This crate defines all shared data structures used for:
//! - Configuration file parsing (`repo-runner.toml`)
//! - Pipeline stage outcomes and run state
//! - The progress stream sent to the observer and the status snapshot
//!
//! ## Modules
//!
//! - [`config_models`]: Provisioning configuration
//! - [`pipeline_models`]: Stage table, stage results, run outcomes
//! - [`process_models`]: Tiers, runtime environments, managed processes
//! - [`ipc`]: Progress events and status snapshots
//!
//! ## Design Principles
//!
//! - Minimal dependencies: Only serde, ts-rs, uuid and chrono
//! - TypeScript generation: All types derive `TS` for observer compatibility
//! - Independent compilation: No dependencies on other repo-runner crates

pub mod config_models;
pub mod ipc;
pub mod pipeline_models;
pub mod process_models;

// Re-export all public types for convenience
pub use config_models::*;
pub use ipc::*;
pub use pipeline_models::*;
pub use process_models::*;
