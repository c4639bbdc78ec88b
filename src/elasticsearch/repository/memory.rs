//! In-process engine with the same contract as the HTTP repository
//!
//! Keeps indices, documents and aliases in memory and records every write
//! it performs, which is what the facade tests assert on.

use anyhow::Result;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use super::IndexRepository;
use crate::elasticsearch::definition::IndexDefinition;
use crate::elasticsearch::errors::EngineError;
use crate::elasticsearch::index::{Document, ExportRows, RowId};

/// A write the repository performed, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    CreateIndex(String),
    UpdateAlias { alias: String, index: String },
    BulkUpdate { index: String, ids: Vec<RowId> },
    DeleteIds { index: String, ids: Vec<RowId> },
    DeleteNotPresent { index: String, removed: Vec<RowId> },
    Reindex { source: String, target: String },
    DeleteIndex(String),
}

#[derive(Debug, Default)]
struct StoredIndex {
    mapping: Value,
    documents: BTreeMap<RowId, Document>,
}

#[derive(Debug, Default)]
struct State {
    indices: BTreeMap<String, StoredIndex>,
    aliases: BTreeMap<String, String>,
    operations: Vec<Operation>,
}

impl State {
    /// Resolve an alias or physical index name to a physical index name
    fn resolve(&self, name: &str) -> Result<String> {
        if let Some(target) = self.aliases.get(name) {
            return Ok(target.clone());
        }
        if self.indices.contains_key(name) {
            return Ok(name.to_string());
        }
        Err(EngineError::IndexNotFound(name.to_string()).into())
    }

    fn physical_mut(&mut self, name: &str) -> Result<(String, &mut StoredIndex)> {
        let physical = self.resolve(name)?;
        let index = self
            .indices
            .get_mut(&physical)
            .ok_or_else(|| EngineError::IndexNotFound(physical.clone()))?;
        Ok((physical, index))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: Mutex<State>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a physical index directly, bypassing definitions
    pub fn create_raw_index(&self, index_name: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.indices.contains_key(index_name) {
            return Err(EngineError::IndexAlreadyExists(index_name.to_string()).into());
        }
        state
            .indices
            .insert(index_name.to_string(), StoredIndex::default());
        Ok(())
    }

    /// Point `alias` at an existing physical index directly
    pub fn put_alias(&self, alias: &str, index_name: &str) -> Result<()> {
        let mut state = self.state.lock();
        if !state.indices.contains_key(index_name) {
            return Err(EngineError::IndexNotFound(index_name.to_string()).into());
        }
        state
            .aliases
            .insert(alias.to_string(), index_name.to_string());
        Ok(())
    }

    pub fn index_names(&self) -> Vec<String> {
        self.state.lock().indices.keys().cloned().collect()
    }

    pub fn alias_target(&self, alias: &str) -> Option<String> {
        self.state.lock().aliases.get(alias).cloned()
    }

    /// Mapping the physical index was created with
    pub fn mapping(&self, index_name: &str) -> Option<Value> {
        let state = self.state.lock();
        state.indices.get(index_name).map(|index| index.mapping.clone())
    }

    /// Ids stored in an index or behind an alias
    pub fn document_ids(&self, name: &str) -> Result<Vec<RowId>> {
        let state = self.state.lock();
        let physical = state.resolve(name)?;
        Ok(state.indices[&physical].documents.keys().copied().collect())
    }

    pub fn document(&self, name: &str, id: RowId) -> Option<Document> {
        let state = self.state.lock();
        let physical = state.resolve(name).ok()?;
        state.indices[&physical].documents.get(&id).cloned()
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.state.lock().operations.clone()
    }

    pub fn clear_operations(&self) {
        self.state.lock().operations.clear();
    }
}

impl IndexRepository for InMemoryRepository {
    fn create_index(&self, definition: &IndexDefinition) -> Result<()> {
        let index_name = definition.versioned_index_name()?;
        let mapping = definition.definition()?;

        let mut state = self.state.lock();
        if state.indices.contains_key(&index_name) {
            return Err(EngineError::IndexAlreadyExists(index_name).into());
        }
        state.indices.insert(
            index_name.clone(),
            StoredIndex {
                mapping,
                documents: BTreeMap::new(),
            },
        );
        state.operations.push(Operation::CreateIndex(index_name));
        Ok(())
    }

    fn create_alias(&self, definition: &IndexDefinition) -> Result<()> {
        let alias = definition.index_alias();
        let target = definition.versioned_index_name()?;

        let mut state = self.state.lock();
        if !state.indices.contains_key(&target) {
            return Err(EngineError::IndexNotFound(target).into());
        }
        state.aliases.insert(alias.clone(), target.clone());
        state.operations.push(Operation::UpdateAlias {
            alias,
            index: target,
        });
        Ok(())
    }

    fn find_current_index_name_for_alias(&self, alias: &str) -> Result<String> {
        self.state
            .lock()
            .aliases
            .get(alias)
            .cloned()
            .ok_or_else(|| EngineError::NoAlias(alias.to_string()).into())
    }

    fn bulk_update(&self, index_name: &str, rows: &ExportRows) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut state = self.state.lock();
        let (physical, index) = state.physical_mut(index_name)?;
        for (id, document) in rows {
            index.documents.insert(*id, document.clone());
        }
        state.operations.push(Operation::BulkUpdate {
            index: physical,
            ids: rows.keys().copied().collect(),
        });
        Ok(())
    }

    fn delete_ids(&self, index_name: &str, ids: &[RowId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut state = self.state.lock();
        let (physical, index) = state.physical_mut(index_name)?;
        for id in ids {
            index.documents.remove(id);
        }
        state.operations.push(Operation::DeleteIds {
            index: physical,
            ids: ids.to_vec(),
        });
        Ok(())
    }

    fn delete_not_present(&self, definition: &IndexDefinition, present_ids: &[RowId]) -> Result<()> {
        let present: BTreeSet<RowId> = present_ids.iter().copied().collect();

        let mut state = self.state.lock();
        let (physical, index) = state.physical_mut(&definition.index_alias())?;
        let removed: Vec<RowId> = index
            .documents
            .keys()
            .filter(|id| !present.contains(*id))
            .copied()
            .collect();
        for id in &removed {
            index.documents.remove(id);
        }
        state.operations.push(Operation::DeleteNotPresent {
            index: physical,
            removed,
        });
        Ok(())
    }

    fn reindex(&self, source_index: &str, target_index: &str) -> Result<()> {
        let mut state = self.state.lock();
        let documents = state
            .indices
            .get(source_index)
            .ok_or_else(|| EngineError::IndexNotFound(source_index.to_string()))?
            .documents
            .clone();
        let target = state
            .indices
            .get_mut(target_index)
            .ok_or_else(|| EngineError::IndexNotFound(target_index.to_string()))?;
        target.documents.extend(documents);

        state.operations.push(Operation::Reindex {
            source: source_index.to_string(),
            target: target_index.to_string(),
        });
        Ok(())
    }

    fn delete_index(&self, index_name: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.indices.remove(index_name).is_none() {
            return Err(EngineError::IndexNotFound(index_name.to_string()).into());
        }
        state.aliases.retain(|_, target| target.as_str() != index_name);
        state
            .operations
            .push(Operation::DeleteIndex(index_name.to_string()));
        Ok(())
    }
}
