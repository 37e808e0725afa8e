//! Configuration file loader for `repo-runner.toml`.
//!
//! The loader looks for `repo-runner.toml` in the given root directory, or
//! reads an explicitly named file. Missing files yield the default
//! configuration; present files must parse and validate.

use crate::config::error::ConfigError;
use crate::config::error::ConfigResult;
use crate::config::models::AppConfig;
use rr_protocol::config_models::ProvisionConfig;
use std::path::Path;

/// File name looked up in the root directory.
pub const CONFIG_FILE_NAME: &str = "repo-runner.toml";

/// Loads and validates the provisioning configuration.
///
/// # Arguments
///
/// * `root` - Directory searched for `repo-runner.toml`
/// * `explicit` - A specific file to load instead. Relative paths in it are
///   resolved against the file's own directory.
///
/// # Errors
///
/// Returns `ConfigError` if:
/// - An explicitly named file cannot be read
/// - A file exists but has invalid TOML syntax
/// - The parsed configuration violates an invariant (see [`validate`])
pub fn load_config(root: &Path, explicit: Option<&Path>) -> ConfigResult<AppConfig> {
    let config = match explicit {
        Some(path) => {
            let provision = read_config_file(path)?;
            let base = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(root);
            AppConfig::new(base, provision)
        }
        None => {
            let path = root.join(CONFIG_FILE_NAME);
            if path.exists() {
                AppConfig::new(root, read_config_file(&path)?)
            } else {
                tracing::debug!("No {} in {}, using defaults", CONFIG_FILE_NAME, root.display());
                AppConfig::new(root, ProvisionConfig::default())
            }
        }
    };

    validate(&config.provision)?;
    Ok(config)
}

fn read_config_file(path: &Path) -> ConfigResult<ProvisionConfig> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Validates a parsed configuration.
///
/// Rejects empty names and remotes, a non-http(s) archive URL, zero budgets and intervals, and
/// overlapping port pairs: the orchestrator's own ports must never collide
/// with the ports of the tiers it provisions.
pub fn validate(config: &ProvisionConfig) -> ConfigResult<()> {
    let repo = &config.repository;
    if repo.name.trim().is_empty() {
        return invalid("repository.name cannot be empty");
    }
    if repo.archive_root.trim().is_empty() {
        return invalid("repository.archive_root cannot be empty");
    }
    // Any remote git accepts is fine; the archive is fetched over HTTP
    if repo.remote_url.trim().is_empty() {
        return invalid("repository.remote_url cannot be empty");
    }
    if !repo.archive_url.starts_with("http://") && !repo.archive_url.starts_with("https://") {
        return invalid("repository.archive_url must start with http:// or https://");
    }

    if config.backend.dir.trim().is_empty() || config.frontend.dir.trim().is_empty() {
        return invalid("tier directories cannot be empty");
    }
    if config.backend.minimal_packages.is_empty() {
        return invalid("backend.minimal_packages cannot be empty");
    }
    if config.backend.ready_timeout_secs == 0 || config.frontend.ready_timeout_secs == 0 {
        return invalid("ready_timeout_secs must be greater than 0");
    }
    if config.supervisor.poll_interval_ms == 0 {
        return invalid("supervisor.poll_interval_ms must be greater than 0");
    }
    if config.supervisor.probe_timeout_ms == 0 {
        return invalid("supervisor.probe_timeout_ms must be greater than 0");
    }

    let tier_ports = [config.backend.port, config.frontend.port];
    let own_ports = [config.server.api_port, config.server.ui_port];
    if tier_ports[0] == tier_ports[1] {
        return invalid("backend.port and frontend.port must differ");
    }
    if own_ports[0] == own_ports[1] {
        return invalid("server.api_port and server.ui_port must differ");
    }
    if let Some(port) = own_ports.iter().find(|p| tier_ports.contains(p)) {
        return invalid(&format!(
            "port {port} is used both by the orchestrator and a provisioned tier"
        ));
    }

    Ok(())
}

fn invalid(reason: &str) -> ConfigResult<()> {
    Err(ConfigError::Invalid {
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_config(temp_dir.path(), None).unwrap();

        assert_eq!(config.provision, ProvisionConfig::default());
        assert_eq!(config.root, temp_dir.path());
    }

    #[test]
    fn test_load_config_from_root() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(CONFIG_FILE_NAME),
            r#"
[repository]
name = "demo"

[frontend]
port = 4000
"#,
        )
        .unwrap();

        let config = load_config(temp_dir.path(), None).unwrap();
        assert_eq!(config.provision.repository.name, "demo");
        assert_eq!(config.provision.frontend.port, 4000);
        assert_eq!(config.repo_path(), temp_dir.path().join("cloned_repos/demo"));
    }

    #[test]
    fn test_load_config_explicit_path_resolves_against_its_directory() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("conf");
        fs::create_dir_all(&nested).unwrap();
        let path = nested.join("custom.toml");
        fs::write(&path, "[workspace]\nwork_dir = \"work\"\n").unwrap();

        let config = load_config(temp_dir.path(), Some(&path)).unwrap();
        assert_eq!(config.work_dir(), nested.join("work"));
    }

    #[test]
    fn test_load_config_explicit_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = load_config(temp_dir.path(), Some(&temp_dir.path().join("nope.toml")));
        assert!(matches!(result, Err(ConfigError::FileRead { .. })));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(CONFIG_FILE_NAME), "[backend\nport = 1").unwrap();

        let result = load_config(temp_dir.path(), None);
        assert!(matches!(result, Err(ConfigError::TomlParse { .. })));
    }

    #[test]
    fn test_validate_default_config() {
        assert!(validate(&ProvisionConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_accepts_any_git_remote() {
        for remote in [
            "git@github.com:owner/repo.git",
            "ssh://git@example.com/owner/repo.git",
            "file:///srv/git/repo.git",
        ] {
            let mut config = ProvisionConfig::default();
            config.repository.remote_url = remote.to_string();
            assert!(validate(&config).is_ok(), "{remote} should be accepted");
        }
    }

    #[test]
    fn test_validate_rejects_port_collision() {
        let mut config = ProvisionConfig::default();
        config.server.api_port = config.backend.port;

        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("8000"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ProvisionConfig::default();
        config.repository.remote_url = String::new();
        assert!(validate(&config).is_err());

        let mut config = ProvisionConfig::default();
        config.repository.archive_url = "ftp://example.com/main.tar.gz".to_string();
        assert!(validate(&config).is_err());

        let mut config = ProvisionConfig::default();
        config.supervisor.poll_interval_ms = 0;
        assert!(validate(&config).is_err());

        let mut config = ProvisionConfig::default();
        config.frontend.port = config.backend.port;
        assert!(validate(&config).is_err());

        let mut config = ProvisionConfig::default();
        config.repository.name = " ".to_string();
        assert!(validate(&config).is_err());
    }
}
