//! Scaffolding for acquired source trees.
//!
//! Writes the minimal dependency manifests a tier needs when the repository
//! does not ship one, and the per-tier launcher scripts that let a user
//! restart a provisioned server by hand. Contents come from embedded
//! templates (see [`templates`]).

pub mod error;
pub mod generator;
pub mod templates;

pub use error::{ScaffoldError, ScaffoldResult};
pub use generator::{ensure_manifest, write_launcher, LauncherVars, ManifestStatus};
pub use templates::{get_template, render};
