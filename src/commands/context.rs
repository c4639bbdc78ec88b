//! Composition root shared by every subcommand

use anyhow::{Context, Result};
use std::path::Path;

use index_sync::elasticsearch::{
    ElasticsearchRepository, Index, IndexDefinitionLoader, IndexFacade, IndexRegistry,
};
use index_sync::source::{ChangedFlagReset, SqliteIndex};
use index_sync::Config;

pub struct SyncContext {
    pub config: Config,
    pub loader: IndexDefinitionLoader,
    pub registry: IndexRegistry,
    pub facade: IndexFacade<ElasticsearchRepository>,
}

impl SyncContext {
    /// Wire config, row sources and the engine client together.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load(config_path)?;

        if config.indexes.is_empty() {
            anyhow::bail!(
                "No indexes configured.\n\
                 Add [[indexes]] entries to index-sync.toml or pass --config <file>"
            );
        }

        let database = config.database_path()?;
        if !database.exists() {
            anyhow::bail!("Source database not found: {}", database.display());
        }

        let mut indexes: Vec<Box<dyn Index>> = Vec::with_capacity(config.indexes.len());
        let mut flag_reset = ChangedFlagReset::open(&database)?;
        for section in &config.indexes {
            let spec = section.table_spec();
            flag_reset.watch(&section.name, &spec)?;
            let index = SqliteIndex::open(section.name.clone(), &database, spec)
                .with_context(|| format!("Failed to set up index '{}'", section.name))?;
            indexes.push(Box::new(index));
        }
        let registry = IndexRegistry::new(indexes)?;

        let repository = ElasticsearchRepository::new(config.elasticsearch.url.clone(), config.timeout())?
            .with_reindex_poll_interval(config.reindex_poll_interval());
        let mut facade = IndexFacade::new(repository);
        facade.add_listener(Box::new(flag_reset));

        tracing::debug!(
            url = %config.elasticsearch.url,
            indexes = ?registry.registered_index_names(),
            "context loaded"
        );

        Ok(Self {
            loader: config.definition_loader(),
            config,
            registry,
            facade,
        })
    }

    /// One index by name, or every registered index in registration order.
    pub fn select(&self, index_name: Option<&str>) -> Result<Vec<&dyn Index>> {
        self.registry.select(index_name)
    }
}
