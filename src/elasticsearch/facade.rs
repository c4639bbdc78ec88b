//! Export and migration orchestration
//!
//! The facade composes an [`Index`] (row source), its [`IndexDefinition`]
//! and an [`IndexRepository`] (engine) into the operations the CLI and the
//! end-of-request hook run:
//!
//! | Operation | Writes |
//! |-----------|--------|
//! | `create` | new physical index, alias |
//! | `export` | every row, then prunes documents not seen |
//! | `export_changed` | rows flagged as changed, no pruning |
//! | `export_ids` | given ids; ids without data are deleted |
//! | `migrate` | new physical index, reindex, alias swap, old index deleted |
//! | `delete` | physical index behind the alias |
//!
//! Batches are strictly sequential: each one starts after the last id of the
//! previous. Memory is bounded by the batch size plus the list of exported
//! ids needed for pruning.

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::definition::IndexDefinition;
use super::errors::EngineError;
use super::events::{IndexExportedEvent, IndexExportedListener};
use super::index::{Index, RowId};
use super::repository::IndexRepository;

/// Counters of one export run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportReport {
    /// Row ids processed: upserted by a full export, upserted or deleted
    /// by a changed export. Pruned documents are not counted.
    pub exported: usize,
    /// Non-empty batches processed
    pub batches: usize,
}

/// Result of [`IndexFacade::migrate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The alias already points at the current mapping version
    UpToDate { index: String },
    Migrated { from: String, to: String },
}

/// Where an alias points compared to where it should point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStatus {
    pub alias: String,
    /// Physical index currently behind the alias (or the legacy alias)
    pub current: Option<String>,
    /// Physical index name for the mapping on disk
    pub expected: String,
}

impl IndexStatus {
    pub fn is_created(&self) -> bool {
        self.current.is_some()
    }

    pub fn needs_migration(&self) -> bool {
        matches!(&self.current, Some(current) if *current != self.expected)
    }
}

pub struct IndexFacade<R: IndexRepository> {
    repository: R,
    listeners: Vec<Box<dyn IndexExportedListener>>,
}

impl<R: IndexRepository> IndexFacade<R> {
    pub fn new(repository: R) -> Self {
        Self {
            repository,
            listeners: Vec::new(),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Register an observer notified after every completed export
    pub fn add_listener(&mut self, listener: Box<dyn IndexExportedListener>) {
        self.listeners.push(listener);
    }

    /// First-time setup: physical index plus alias. Existing data is not migrated.
    pub fn create(&self, definition: &IndexDefinition) -> Result<()> {
        self.repository
            .create_index(definition)
            .with_context(|| format!("Failed to create index {}", definition.index_name()))?;
        self.repository
            .create_alias(definition)
            .with_context(|| format!("Failed to create alias {}", definition.index_alias()))?;

        info!(index = definition.index_name(), alias = %definition.index_alias(), "index created");
        Ok(())
    }

    /// Full export: upsert every row batch by batch, then prune documents
    /// whose rows no longer exist.
    pub fn export(&self, index: &dyn Index, definition: &IndexDefinition) -> Result<ExportReport> {
        let alias = definition.index_alias();

        let query_logging = index.query_logging();
        index.set_query_logging(false);
        let exported = self.export_all_batches(index, &alias);
        index.set_query_logging(query_logging);
        let (exported_ids, batches) = exported?;

        self.repository
            .delete_not_present(definition, &exported_ids)
            .with_context(|| format!("Failed to prune stale documents from {alias}"))?;

        let report = ExportReport {
            exported: exported_ids.len(),
            batches,
        };
        info!(index = index.name(), exported = report.exported, batches = report.batches, "full export finished");

        self.notify_exported(index)?;
        Ok(report)
    }

    fn export_all_batches(&self, index: &dyn Index, alias: &str) -> Result<(Vec<RowId>, usize)> {
        let batch_size = index.export_batch_size().max(1);
        let mut exported_ids = Vec::new();
        let mut last_processed_id: RowId = 0;
        let mut batches = 0;

        loop {
            index.clear_cache();
            let batch = index
                .export_data_for_batch(last_processed_id, batch_size)
                .with_context(|| format!("Failed to read export batch after id {last_processed_id}"))?;

            let Some((&last_id, _)) = batch.last_key_value() else {
                break;
            };

            self.repository.bulk_update(alias, &batch)?;
            exported_ids.extend(batch.keys().copied());
            last_processed_id = last_id;
            batches += 1;
            debug!(index = index.name(), rows = batch.len(), last_id, "batch exported");

            // A short batch is the last one; its rows are already written.
            if batch.len() < batch_size {
                break;
            }
        }

        Ok((exported_ids, batches))
    }

    /// Incremental export of the rows the source flags as changed.
    ///
    /// Indexes without the capability are skipped without writes or events.
    pub fn export_changed(&self, index: &dyn Index, definition: &IndexDefinition) -> Result<ExportReport> {
        let Some(changes) = index.as_changes_only() else {
            info!(index = index.name(), "index does not support changed-only export, skipping");
            return Ok(ExportReport::default());
        };

        let batch_size = index.export_batch_size().max(1);
        let mut report = ExportReport::default();
        let mut last_processed_id: RowId = 0;

        loop {
            let changed_ids = changes
                .changed_ids_for_batch(last_processed_id, batch_size)
                .with_context(|| format!("Failed to read changed ids after id {last_processed_id}"))?;

            let Some(&last_id) = changed_ids.last() else {
                break;
            };

            self.export_ids(index, definition, &changed_ids)?;
            report.exported += changed_ids.len();
            report.batches += 1;
            last_processed_id = last_id;
        }

        info!(index = index.name(), exported = report.exported, "changed export finished");

        self.notify_exported(index)?;
        Ok(report)
    }

    /// Re-export specific rows. Ids the source no longer returns are
    /// deleted from the index.
    pub fn export_ids(&self, index: &dyn Index, definition: &IndexDefinition, ids: &[RowId]) -> Result<()> {
        let alias = definition.index_alias();

        for chunk in ids.chunks(index.export_batch_size().max(1)) {
            index.clear_cache();
            let data = index
                .export_data_for_ids(chunk)
                .context("Failed to read export data for ids")?;

            if !data.is_empty() {
                self.repository.bulk_update(&alias, &data)?;
            }

            let ids_to_delete: Vec<RowId> = chunk
                .iter()
                .copied()
                .filter(|id| !data.contains_key(id))
                .collect();

            if !ids_to_delete.is_empty() {
                debug!(index = index.name(), count = ids_to_delete.len(), "deleting documents without source rows");
                self.repository.delete_ids(&alias, &ids_to_delete)?;
            }
        }

        Ok(())
    }

    /// Move the alias to a physical index built from the current mapping.
    ///
    /// No-op when the alias already points there. If reindexing or the alias
    /// swap fails, the new physical index is deleted again and the alias
    /// keeps pointing at the old one.
    pub fn migrate(&self, definition: &IndexDefinition) -> Result<MigrationOutcome> {
        let new_index = definition.versioned_index_name()?;
        let old_index = self.current_index_name(definition)?;

        if old_index == new_index {
            info!(index = definition.index_name(), physical = %new_index, "index is up to date");
            return Ok(MigrationOutcome::UpToDate { index: new_index });
        }

        self.repository
            .create_index(definition)
            .with_context(|| format!("Failed to create index {new_index}"))?;

        let switched = self
            .repository
            .reindex(&old_index, &new_index)
            .and_then(|_| self.repository.create_alias(definition));
        if let Err(err) = switched {
            self.discard_index(&new_index);
            return Err(err.context(format!("Failed to migrate {old_index} to {new_index}")));
        }

        self.repository
            .delete_index(&old_index)
            .with_context(|| format!("Failed to delete old index {old_index}"))?;

        info!(index = definition.index_name(), from = %old_index, to = %new_index, "index migrated");
        Ok(MigrationOutcome::Migrated {
            from: old_index,
            to: new_index,
        })
    }

    /// Teardown of the physical index behind the definition's alias
    pub fn delete(&self, definition: &IndexDefinition) -> Result<()> {
        self.repository
            .delete_index_by_definition(definition)
            .with_context(|| format!("Failed to delete index {}", definition.index_name()))?;

        info!(index = definition.index_name(), "index deleted");
        Ok(())
    }

    pub fn status(&self, definition: &IndexDefinition) -> Result<IndexStatus> {
        let expected = definition.versioned_index_name()?;
        let current = match self.current_index_name(definition) {
            Ok(name) => Some(name),
            Err(err) if EngineError::is_no_alias(&err) => None,
            Err(err) => return Err(err),
        };

        Ok(IndexStatus {
            alias: definition.index_alias(),
            current,
            expected,
        })
    }

    /// Physical index behind the alias, falling back to the legacy alias name
    fn current_index_name(&self, definition: &IndexDefinition) -> Result<String> {
        let alias = definition.index_alias();
        match self.repository.find_current_index_name_for_alias(&alias) {
            Err(err) if EngineError::is_no_alias(&err) && definition.legacy_index_alias() != alias => {
                debug!(alias = %alias, legacy = %definition.legacy_index_alias(), "alias missing, trying legacy alias");
                self.repository
                    .find_current_index_name_for_alias(&definition.legacy_index_alias())
            }
            result => result,
        }
    }

    fn discard_index(&self, index_name: &str) {
        if let Err(err) = self.repository.delete_index(index_name) {
            warn!(index = %index_name, error = %format!("{err:#}"), "failed to clean up partially migrated index");
        }
    }

    fn notify_exported(&self, index: &dyn Index) -> Result<()> {
        let event = IndexExportedEvent {
            index_name: index.name().to_string(),
        };
        for listener in &self.listeners {
            listener
                .on_index_exported(&event)
                .with_context(|| format!("Index exported listener failed for {}", event.index_name))?;
        }
        Ok(())
    }
}
