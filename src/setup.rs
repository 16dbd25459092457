//! First-run workspace preparation
//!
//! Creates the working directories and writes a default configuration file per
//! environment. Existing files are never overwritten.

use crate::config::{write_settings, ConfigManager, Environment, Settings};
use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const DIRECTORIES: &[&str] = &["logs", "data/users", "data/cache", "temp", "config"];

/// What a setup run did
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SetupReport {
    pub created_dirs: Vec<PathBuf>,
    pub written_configs: Vec<PathBuf>,
}

/// Settings written for a fresh environment file
pub fn default_settings_for(environment: Environment) -> Settings {
    let base = Settings {
        environment,
        ..Settings::default()
    };
    match environment {
        Environment::Development => Settings {
            debug: true,
            log_level: "DEBUG".to_string(),
            ..base
        },
        Environment::Production => Settings {
            api_host: "0.0.0.0".to_string(),
            ..base
        },
        Environment::Test => Settings {
            log_level: "DEBUG".to_string(),
            api_port: 0,
            ..base
        },
    }
}

/// Prepare `root` for running the assistant
pub fn run_setup(root: &Path) -> Result<SetupReport> {
    let mut report = SetupReport::default();

    for dir in DIRECTORIES {
        let path = root.join(dir);
        if !path.is_dir() {
            fs::create_dir_all(&path)?;
            info!("Created directory: {}", path.display());
            report.created_dirs.push(path);
        }
    }

    for environment in [Environment::Development, Environment::Production] {
        let path = root.join(ConfigManager::default_config_path(environment));
        if !path.exists() {
            write_settings(&path, &default_settings_for(environment))?;
            info!("Created config file: {}", path.display());
            report.written_configs.push(path);
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();

        let first = run_setup(dir.path()).unwrap();
        assert_eq!(first.created_dirs.len(), DIRECTORIES.len());
        assert_eq!(first.written_configs.len(), 2);
        assert!(dir.path().join("data/cache").is_dir());

        let second = run_setup(dir.path()).unwrap();
        assert_eq!(second, SetupReport::default());
    }

    #[test]
    fn test_written_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        run_setup(dir.path()).unwrap();

        let path = dir.path().join("config/production.toml");
        let manager = ConfigManager::load_from_path(
            &path,
            Environment::Development,
            [("UNRELATED", "1")],
        )
        .unwrap();
        assert_eq!(manager.settings().environment, Environment::Production);
        assert_eq!(manager.settings().api_host, "0.0.0.0");
        assert!(!manager.settings().debug);
    }
}
