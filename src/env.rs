//! Environment constants and path utilities.
//!
//! Centralizes configuration file locations and environment variable names so
//! the discovery order is defined in one place.

use std::path::{Path, PathBuf};

/// Application directory name (hidden directory like .git, .vscode)
pub const APP_DIR_NAME: &str = ".localcode";

/// Configuration file name inside the application directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Project-root configuration file name
pub const PROJECT_CONFIG_FILE_NAME: &str = "localcode.toml";

/// System-wide configuration directory
pub const SYSTEM_CONFIG_DIR: &str = "/etc/localcode";

/// Environment variable names read at startup
pub mod vars {
    /// Explicit endpoint, `host:port` or URL
    pub const ENDPOINT: &str = "LOCALCODE_ENDPOINT";

    /// Explicit provider kind, e.g. `ollama`
    pub const PROVIDER: &str = "LOCALCODE_PROVIDER";

    /// Default model name
    pub const MODEL: &str = "LOCALCODE_MODEL";

    /// Bearer token for servers started with an API key
    pub const API_KEY: &str = "LOCALCODE_API_KEY";

    pub const HOME: &str = "HOME";
}

/// Default log filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "localcode=info";

/// Log filter used with `--verbose`
pub const VERBOSE_LOG_FILTER: &str = "localcode=debug";

/// `./localcode.toml`
pub fn project_config_file_path(current_dir: &Path) -> PathBuf {
    current_dir.join(PROJECT_CONFIG_FILE_NAME)
}

/// `./.localcode/config.toml`
pub fn local_config_file_path(current_dir: &Path) -> PathBuf {
    current_dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME)
}

/// `~/.localcode`
pub fn user_config_dir_path(home_dir: &Path) -> PathBuf {
    home_dir.join(APP_DIR_NAME)
}

/// `~/.localcode/config.toml`
pub fn user_config_file_path(home_dir: &Path) -> PathBuf {
    user_config_dir_path(home_dir).join(CONFIG_FILE_NAME)
}

/// `/etc/localcode/config.toml`
pub fn system_config_file_path() -> PathBuf {
    Path::new(SYSTEM_CONFIG_DIR).join(CONFIG_FILE_NAME)
}

/// Configuration files in precedence order; the first existing one wins.
pub fn config_search_paths(current_dir: &Path, home_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = vec![
        project_config_file_path(current_dir),
        local_config_file_path(current_dir),
    ];
    if let Some(home) = home_dir {
        paths.push(user_config_file_path(home));
    }
    paths.push(system_config_file_path());
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_paths() {
        let home_dir = Path::new("/home/user");
        let current_dir = Path::new("/current/project");

        assert_eq!(
            user_config_file_path(home_dir),
            Path::new("/home/user/.localcode/config.toml")
        );
        assert_eq!(
            local_config_file_path(current_dir),
            Path::new("/current/project/.localcode/config.toml")
        );
        assert_eq!(
            project_config_file_path(current_dir),
            Path::new("/current/project/localcode.toml")
        );
    }

    #[test]
    fn test_search_order() {
        let paths = config_search_paths(Path::new("/p"), Some(Path::new("/h")));
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/p/localcode.toml"),
                PathBuf::from("/p/.localcode/config.toml"),
                PathBuf::from("/h/.localcode/config.toml"),
                PathBuf::from("/etc/localcode/config.toml"),
            ]
        );
        assert_eq!(config_search_paths(Path::new("/p"), None).len(), 3);
    }
}
