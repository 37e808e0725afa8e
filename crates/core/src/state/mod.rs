//! State management for provisioning runs.
//!
//! This module provides:
//! - The run context passed through every stage
//! - The shared status record answered to status queries
//! - RunManager for starting runs and keeping the last result

pub mod manager;
pub mod run;
pub mod status;

pub use manager::RunManager;
pub use run::PipelineRun;
pub use status::SharedStatus;
