//! Deferred, per-request export of rows touched during a unit of work
//!
//! Domain writes call [`ExportScheduler::schedule_row_id`]; at the end of the
//! request or command the owning [`ExportScope`] is flushed exactly once and
//! every pending id is pushed through `IndexFacade::export_ids`. A scope that
//! is dropped without flushing discards its ids: nothing is persisted and
//! nothing leaks into the next request.

use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};

use super::definition::IndexDefinitionLoader;
use super::errors::RegistryError;
use super::facade::IndexFacade;
use super::index::{Index, RowId};
use super::registry::IndexRegistry;
use super::repository::IndexRepository;

/// Pending row ids of one index, deduplicated and ascending.
#[derive(Debug, Default, Clone)]
pub struct ExportScheduler {
    row_ids: BTreeSet<RowId>,
}

impl ExportScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_row_id(&mut self, row_id: RowId) {
        self.row_ids.insert(row_id);
    }

    pub fn schedule_row_ids(&mut self, row_ids: impl IntoIterator<Item = RowId>) {
        self.row_ids.extend(row_ids);
    }

    pub fn has_any(&self) -> bool {
        !self.row_ids.is_empty()
    }

    pub fn pending_ids(&self) -> Vec<RowId> {
        self.row_ids.iter().copied().collect()
    }

    /// Drain the pending ids, leaving the scheduler empty.
    pub fn take_row_ids(&mut self) -> Vec<RowId> {
        std::mem::take(&mut self.row_ids).into_iter().collect()
    }

    /// End-of-request hook for a single index.
    ///
    /// No-op when nothing is pending. Otherwise clears the row source cache
    /// and re-exports the pending ids. Returns whether anything was exported.
    pub fn flush<R: IndexRepository>(
        &mut self,
        facade: &IndexFacade<R>,
        index: &dyn Index,
        loader: &IndexDefinitionLoader,
    ) -> Result<bool> {
        if !self.has_any() {
            return Ok(false);
        }

        let row_ids = self.take_row_ids();
        index.clear_cache();
        let definition = loader.index_definition(index.name());
        facade.export_ids(index, &definition, &row_ids)?;
        Ok(true)
    }
}

/// Request- or command-scoped set of schedulers, one per index name.
///
/// [`flush`](Self::flush) takes `self` by value, so a scope can be flushed at
/// most once.
#[derive(Debug, Default)]
pub struct ExportScope {
    schedulers: BTreeMap<String, ExportScheduler>,
}

impl ExportScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheduler for `index_name`, created on first use
    pub fn scheduler(&mut self, index_name: &str) -> &mut ExportScheduler {
        self.schedulers.entry(index_name.to_string()).or_default()
    }

    pub fn has_pending(&self) -> bool {
        self.schedulers.values().any(ExportScheduler::has_any)
    }

    /// Export everything scheduled during this scope, in registration order.
    ///
    /// Returns the number of indexes that had pending ids. Ids scheduled for
    /// an unregistered index fail the flush before anything is written. Stops
    /// at the first failing index; ids of the remaining indexes are discarded.
    pub fn flush<R: IndexRepository>(
        mut self,
        facade: &IndexFacade<R>,
        registry: &IndexRegistry,
        loader: &IndexDefinitionLoader,
    ) -> Result<usize> {
        let mut schedulers = std::mem::take(&mut self.schedulers);
        schedulers.retain(|_, scheduler| scheduler.has_any());

        if let Some(unknown) = schedulers
            .keys()
            .find(|name| !registry.is_index_registered(name))
        {
            return Err(RegistryError::IndexNotFound(unknown.clone()).into());
        }

        let mut flushed = 0;
        for index in registry.registered_indexes() {
            let Some(mut scheduler) = schedulers.remove(index.name()) else {
                continue;
            };
            if scheduler.flush(facade, index, loader)? {
                flushed += 1;
            }
        }

        Ok(flushed)
    }
}

impl Drop for ExportScope {
    fn drop(&mut self) {
        for (index_name, scheduler) in &self.schedulers {
            if scheduler.has_any() {
                tracing::warn!(
                    index = %index_name,
                    pending = scheduler.row_ids.len(),
                    "export scope dropped without flush, scheduled ids discarded"
                );
            }
        }
    }
}
