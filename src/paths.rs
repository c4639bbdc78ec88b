//! Filesystem layout of index-sync.
//!
//! Only says WHERE things live; no I/O, no validation.
//!
//! ```text
//! ~/.index-sync/
//! └── config.toml                  # User-level fallback config
//!
//! project/
//! ├── index-sync.toml              # Project config (preferred)
//! └── resources/definition/        # Default mapping directory
//!     └── {index_name}/1.json
//! ```

use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "INDEX_SYNC_CONFIG";

/// Environment variable overriding the engine URL
pub const ELASTICSEARCH_URL_ENV: &str = "ELASTICSEARCH_URL";

/// Project config file name: `index-sync.toml`
pub const PROJECT_CONFIG_FILE: &str = "index-sync.toml";

/// Default mapping directory, relative to the working directory
pub const DEFAULT_DEFINITIONS_DIR: &str = "resources/definition";

/// User home for index-sync: `~/.index-sync/`
pub fn user_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".index-sync")
}

/// User-level config: `~/.index-sync/config.toml`
pub fn user_config_path() -> PathBuf {
    user_home().join("config.toml")
}

/// Project config inside `root`: `{root}/index-sync.toml`
pub fn project_config_path(root: &Path) -> PathBuf {
    root.join(PROJECT_CONFIG_FILE)
}

/// Expand `~` and `$VAR` in a configured path.
///
/// Unknown variables leave the path untouched rather than failing.
pub fn expand(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(path).as_ref()),
    }
}
