//! Search engine side of the pipeline
//!
//! [`IndexRepository`] is the seam between the facade and the engine. The
//! facade is generic over it so the same orchestration runs against the
//! HTTP engine ([`ElasticsearchRepository`]) or the in-process one
//! ([`InMemoryRepository`]).

mod http;
mod memory;

use anyhow::Result;

use super::definition::IndexDefinition;
use super::index::{ExportRows, RowId};

pub use http::ElasticsearchRepository;
pub use memory::{InMemoryRepository, Operation};

/// Operations the facade needs from the search engine.
pub trait IndexRepository {
    /// Create the physical index `definition.versioned_index_name()` with
    /// its mapping. Fails if the index already exists.
    fn create_index(&self, definition: &IndexDefinition) -> Result<()>;

    /// Point the alias at the versioned index, replacing previous targets in
    /// one engine call.
    fn create_alias(&self, definition: &IndexDefinition) -> Result<()>;

    /// Physical index behind `alias`; `EngineError::NoAlias` when missing.
    fn find_current_index_name_for_alias(&self, alias: &str) -> Result<String>;

    /// Upsert one document per row, `_id` = row id.
    fn bulk_update(&self, index_name: &str, rows: &ExportRows) -> Result<()>;

    /// Delete documents by id. Unknown ids are ignored.
    fn delete_ids(&self, index_name: &str, ids: &[RowId]) -> Result<()>;

    /// Delete every document behind the alias whose id is not in `present_ids`.
    fn delete_not_present(&self, definition: &IndexDefinition, present_ids: &[RowId]) -> Result<()>;

    /// Copy all documents from one physical index into another.
    fn reindex(&self, source_index: &str, target_index: &str) -> Result<()>;

    fn delete_index(&self, index_name: &str) -> Result<()>;

    /// Delete the physical index currently behind the definition's alias,
    /// or its versioned index when no alias exists.
    fn delete_index_by_definition(&self, definition: &IndexDefinition) -> Result<()> {
        let index_name = match self.find_current_index_name_for_alias(&definition.index_alias()) {
            Ok(name) => name,
            Err(err) if super::errors::EngineError::is_no_alias(&err) => {
                definition.versioned_index_name()?
            }
            Err(err) => return Err(err),
        };
        self.delete_index(&index_name)
    }
}
