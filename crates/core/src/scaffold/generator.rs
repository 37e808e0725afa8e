//! Manifest and launcher script generation.

use super::error::{ScaffoldError, ScaffoldResult};
use super::templates::{get_template, render};
use crate::platform::OsFamily;
use rr_protocol::process_models::Tier;
use std::fs;
use std::path::{Path, PathBuf};

/// Whether a manifest was already present or had to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestStatus {
    Existing,
    Created,
}

/// Embedded template used when a tier has no manifest.
fn manifest_template(tier: Tier) -> &'static str {
    match tier {
        Tier::Backend => "manifests/requirements.txt",
        Tier::Frontend => "manifests/package.json",
    }
}

/// Make sure `tier_dir/file_name` exists, writing the minimal manifest for
/// the tier if it does not. An existing manifest is never touched.
///
/// # Example
/// ```no_run
/// use rr_core::scaffold::{ensure_manifest, ManifestStatus};
/// use rr_protocol::process_models::Tier;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let status = ensure_manifest(Tier::Backend, Path::new("backend"), "requirements.txt")?;
/// if status == ManifestStatus::Created {
///     println!("wrote a minimal requirements.txt");
/// }
/// # Ok(())
/// # }
/// ```
pub fn ensure_manifest(
    tier: Tier,
    tier_dir: &Path,
    file_name: &str,
) -> ScaffoldResult<ManifestStatus> {
    let path = tier_dir.join(file_name);
    if path.exists() {
        return Ok(ManifestStatus::Existing);
    }

    let template = manifest_template(tier);
    let content =
        get_template(template).ok_or_else(|| ScaffoldError::TemplateNotFound(template.to_string()))?;
    write_file(&path, &content)?;

    tracing::info!("Created minimal manifest {}", path.display());
    Ok(ManifestStatus::Created)
}

/// Values substituted into launcher templates.
#[derive(Debug, Clone)]
pub struct LauncherVars {
    pub dir: PathBuf,
    pub host: String,
    pub port: u16,
    /// ASGI application (backend only).
    pub app: String,
    /// Interpreter path (backend only).
    pub python: PathBuf,
    /// JS package manager (frontend only).
    pub npm: String,
}

impl LauncherVars {
    fn pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("dir", self.dir.display().to_string()),
            ("host", self.host.clone()),
            ("port", self.port.to_string()),
            ("app", self.app.clone()),
            ("python", self.python.display().to_string()),
            ("npm", self.npm.clone()),
        ]
    }
}

/// File name of a tier's launcher script, e.g. `run_backend.sh`.
pub fn launcher_file_name(tier: Tier, family: OsFamily) -> String {
    format!("run_{}.{}", tier.as_str(), family.script_extension())
}

/// Render the tier's launcher for `family` and write it into `tier_dir`.
///
/// Returns the path of the written script. On Unix the script is made
/// executable.
pub fn write_launcher(
    tier: Tier,
    family: OsFamily,
    tier_dir: &Path,
    vars: &LauncherVars,
) -> ScaffoldResult<PathBuf> {
    let file_name = launcher_file_name(tier, family);
    let template_path = format!("launchers/{file_name}");
    let template = get_template(&template_path)
        .ok_or_else(|| ScaffoldError::TemplateNotFound(template_path.clone()))?;

    let pairs = vars.pairs();
    let borrowed: Vec<(&str, &str)> = pairs.iter().map(|(k, v)| (*k, v.as_str())).collect();
    let mut content = render(&template, &borrowed);
    if family == OsFamily::Windows {
        content = content.replace('\n', "\r\n");
    }

    let target = tier_dir.join(&file_name);
    write_file(&target, &content)?;

    #[cfg(unix)]
    if family == OsFamily::Unix {
        use std::os::unix::fs::PermissionsExt;
        let permissions = fs::Permissions::from_mode(0o755);
        fs::set_permissions(&target, permissions).map_err(|source| ScaffoldError::FileWrite {
            path: target.clone(),
            source,
        })?;
    }

    Ok(target)
}

fn write_file(path: &Path, content: &str) -> ScaffoldResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ScaffoldError::DirectoryCreate {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    fs::write(path, content).map_err(|source| ScaffoldError::FileWrite {
        path: path.to_path_buf(),
        source,
    })
}
