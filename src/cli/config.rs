//! Configuration discovery and loading
//!
//! This module handles the configuration discovery hierarchy:
//! 1. Current directory: ./localcode.toml or ./.localcode/config.toml
//! 2. User config: ~/.localcode/config.toml
//! 3. System config: /etc/localcode/config.toml
//! 4. Built-in defaults
//!
//! `LOCALCODE_*` environment variables are applied on top of whichever
//! source was used.

use crate::env;
use crate::integration::{AssistantConfig, ConfigError};
use std::env as std_env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Configuration discovery system
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Discover and load configuration using the hierarchy, then apply
    /// environment overrides
    pub fn discover_config() -> Result<AssistantConfig, ConfigError> {
        let mut config = match Self::find_config_file() {
            Some(config_path) => {
                info!("Loading configuration from: {:?}", config_path);
                AssistantConfig::from_toml_file(config_path)?
            }
            None => {
                info!("No configuration file found, using defaults");
                AssistantConfig::default()
            }
        };
        config.apply_env_overrides(|name| std_env::var(name).ok())?;
        Ok(config)
    }

    /// Load an explicit file, then apply environment overrides
    pub fn load(path: &Path) -> Result<AssistantConfig, ConfigError> {
        info!("Loading configuration override from: {:?}", path);
        let mut config = AssistantConfig::from_toml_file(path)?;
        config.apply_env_overrides(|name| std_env::var(name).ok())?;
        Ok(config)
    }

    /// Find configuration file using discovery hierarchy
    pub fn find_config_file() -> Option<PathBuf> {
        Self::find_in(&Self::get_config_candidates())
    }

    fn find_in(candidates: &[PathBuf]) -> Option<PathBuf> {
        for candidate in candidates {
            debug!("Checking for config file: {:?}", candidate);
            if candidate.is_file() {
                debug!("Found config file: {:?}", candidate);
                return Some(candidate.clone());
            }
        }

        debug!("No config file found in discovery hierarchy");
        None
    }

    /// Get list of configuration file candidates in priority order
    fn get_config_candidates() -> Vec<PathBuf> {
        let current_dir = std_env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let home_dir = Self::get_home_dir();
        env::config_search_paths(&current_dir, home_dir.as_deref())
    }

    /// Get home directory path
    fn get_home_dir() -> Option<PathBuf> {
        std_env::var(env::vars::HOME)
            .ok()
            .or_else(|| std_env::var("USERPROFILE").ok())
            .map(PathBuf::from)
    }

    /// Create a default config file in the user's home directory
    pub fn create_default_user_config() -> Result<PathBuf, ConfigError> {
        let home_dir = Self::get_home_dir()
            .ok_or_else(|| ConfigError::Invalid("could not determine home directory".to_string()))?;
        Self::create_default_config_in(&home_dir)
    }

    fn create_default_config_in(home_dir: &Path) -> Result<PathBuf, ConfigError> {
        let config_dir = env::user_config_dir_path(home_dir);
        let config_path = env::user_config_file_path(home_dir);

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).map_err(|source| ConfigError::Io {
                path: config_dir.clone(),
                source,
            })?;
            info!("Created configuration directory: {:?}", config_dir);
        }

        if !config_path.exists() {
            AssistantConfig::default().to_toml_file(&config_path)?;
            info!("Created default configuration file: {:?}", config_path);
        } else {
            warn!("Configuration file already exists: {:?}", config_path);
        }

        Ok(config_path)
    }

    /// Show configuration discovery information for debugging
    pub fn show_discovery_info() {
        println!("Configuration Discovery Hierarchy:");
        println!();

        let candidates = Self::get_config_candidates();
        for (i, candidate) in candidates.iter().enumerate() {
            let status = if candidate.exists() {
                if candidate.is_file() {
                    "✓ EXISTS"
                } else {
                    "✗ NOT A FILE"
                }
            } else {
                "✗ NOT FOUND"
            };

            println!("  {}. {:?} - {}", i + 1, candidate, status);
        }

        println!();
        match Self::find_in(&candidates) {
            Some(found) => println!("Active configuration: {:?}", found),
            None => println!("Active configuration: Built-in defaults"),
        }

        println!();
        println!("Environment overrides:");
        for name in [env::vars::ENDPOINT, env::vars::PROVIDER, env::vars::MODEL] {
            match std_env::var(name) {
                Ok(value) => println!("  {} = {}", name, value),
                Err(_) => println!("  {} (unset)", name),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_candidates() {
        let candidates = ConfigDiscovery::get_config_candidates();

        assert!(candidates.len() >= 3);
        assert_eq!(candidates[0].file_name().unwrap(), "localcode.toml");
        assert_eq!(
            candidates.last().unwrap(),
            &PathBuf::from("/etc/localcode/config.toml")
        );
    }

    #[test]
    fn test_first_existing_candidate_wins() {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path().join("localcode.toml");
        let local = env::local_config_file_path(temp_dir.path());
        fs::create_dir_all(local.parent().unwrap()).unwrap();
        fs::write(&local, "").unwrap();

        let candidates = vec![project.clone(), local.clone()];
        assert_eq!(ConfigDiscovery::find_in(&candidates), Some(local.clone()));

        fs::write(&project, "").unwrap();
        assert_eq!(ConfigDiscovery::find_in(&candidates), Some(project));
    }

    #[test]
    fn test_create_default_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = ConfigDiscovery::create_default_config_in(temp_dir.path()).unwrap();
        assert!(path.ends_with(".localcode/config.toml"));

        let loaded = AssistantConfig::from_toml_file(&path).unwrap();
        assert_eq!(loaded, AssistantConfig::default());
    }
}
