//! index-sync configuration (`index-sync.toml`)
//!
//! ```toml
//! [elasticsearch]
//! url = "http://localhost:9200"
//! index_prefix = "shop"
//! definitions_dir = "resources/definition"
//!
//! [source]
//! database = "var/shop.db"
//!
//! [[indexes]]
//! name = "product"
//! changed_column = "export_changed"
//! columns = ["name", "price"]
//! ```
//!
//! Every section is optional; missing fields fall back to defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::elasticsearch::{IndexDefinitionLoader, DEFAULT_EXPORT_BATCH_SIZE};
use crate::paths;
use crate::source::TableSpec;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub elasticsearch: ElasticsearchSection,
    #[serde(default)]
    pub source: SourceSection,
    #[serde(default)]
    pub indexes: Vec<IndexSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticsearchSection {
    /// Engine base URL
    #[serde(default = "default_url")]
    pub url: String,
    /// Per-request timeout. Reindexing runs as an engine task and is polled,
    /// so it is not bound by this.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Pause between reindex task status polls
    #[serde(default = "default_reindex_poll_ms")]
    pub reindex_poll_ms: u64,
    /// Prepended to every alias as `{prefix}_`
    #[serde(default)]
    pub index_prefix: String,
    /// Directory holding `{index_name}/1.json` mapping files
    #[serde(default = "default_definitions_dir")]
    pub definitions_dir: String,
}

fn default_url() -> String {
    "http://localhost:9200".to_string()
}
fn default_timeout_secs() -> u64 {
    300
}
fn default_reindex_poll_ms() -> u64 {
    1000
}
fn default_definitions_dir() -> String {
    paths::DEFAULT_DEFINITIONS_DIR.to_string()
}

impl Default for ElasticsearchSection {
    fn default() -> Self {
        Self {
            url: default_url(),
            timeout_secs: default_timeout_secs(),
            reindex_poll_ms: default_reindex_poll_ms(),
            index_prefix: String::new(),
            definitions_dir: default_definitions_dir(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceSection {
    /// SQLite database the indexes read from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSection {
    /// Logical index name
    pub name: String,
    /// Source table, defaults to the index name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    /// Flag column enabling changed-only export
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_column: Option<String>,
    /// Exported columns; empty exports all of them
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_id_column() -> String {
    "id".to_string()
}
fn default_batch_size() -> usize {
    DEFAULT_EXPORT_BATCH_SIZE
}

impl IndexSection {
    pub fn table_spec(&self) -> TableSpec {
        TableSpec {
            table: self.table.clone().unwrap_or_else(|| self.name.clone()),
            id_column: self.id_column.clone(),
            changed_column: self.changed_column.clone(),
            columns: self.columns.clone(),
            batch_size: self.batch_size,
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// Lookup order: `explicit`, `$INDEX_SYNC_CONFIG`, `./index-sync.toml`,
    /// `~/.index-sync/config.toml`. An explicitly named file must exist; if
    /// none of the implicit ones do, defaults are used. `$ELASTICSEARCH_URL`
    /// overrides the configured URL.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match locate(explicit)? {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::default(),
        };

        if let Ok(url) = std::env::var(paths::ELASTICSEARCH_URL_ENV) {
            if !url.is_empty() {
                config.elasticsearch.url = url;
            }
        }

        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::load_from_str(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn load_from_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for index in &self.indexes {
            if index.name.trim().is_empty() {
                anyhow::bail!("Index entries require a non-empty 'name'");
            }
            if index.batch_size == 0 {
                anyhow::bail!("Index '{}' has batch_size 0", index.name);
            }
        }
        if !self.indexes.is_empty() && self.source.database.is_none() {
            anyhow::bail!("[source] database is required when indexes are configured");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.elasticsearch.timeout_secs)
    }

    pub fn reindex_poll_interval(&self) -> Duration {
        Duration::from_millis(self.elasticsearch.reindex_poll_ms)
    }

    pub fn definitions_dir(&self) -> PathBuf {
        paths::expand(&self.elasticsearch.definitions_dir)
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        self.source
            .database
            .as_deref()
            .map(paths::expand)
            .context("No [source] database configured")
    }

    pub fn definition_loader(&self) -> IndexDefinitionLoader {
        IndexDefinitionLoader::new(self.definitions_dir(), self.elasticsearch.index_prefix.clone())
    }
}

fn locate(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        return Ok(Some(path.to_path_buf()));
    }

    if let Ok(path) = std::env::var(paths::CONFIG_ENV) {
        let path = paths::expand(&path);
        if !path.exists() {
            anyhow::bail!("Config file from ${} not found: {}", paths::CONFIG_ENV, path.display());
        }
        return Ok(Some(path));
    }

    let candidates = [
        paths::project_config_path(&std::env::current_dir()?),
        paths::user_config_path(),
    ];
    Ok(candidates.into_iter().find(|path| path.exists()))
}
