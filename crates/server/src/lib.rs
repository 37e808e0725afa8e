//! # rr-server
//!
//! HTTP and websocket surface for repo-runner.
//!
//! - [`api`]: Router, handlers and error mapping
//! - [`cli`]: Command-line arguments
//! - [`doctor`]: Rendering of pre-flight diagnostics

pub mod api;
pub mod cli;
pub mod doctor;
