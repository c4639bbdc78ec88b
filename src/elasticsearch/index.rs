//! Row-source side of an index
//!
//! An [`Index`] knows how to read export rows for one logical index from the
//! source of truth. The facade only ever talks to it through this trait.

use anyhow::Result;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Primary key of a source row; also used as the document `_id`
pub type RowId = i64;

/// Fields of one search document
pub type Document = Map<String, Value>;

/// Rows keyed by id, iterated in ascending id order
pub type ExportRows = BTreeMap<RowId, Document>;

/// Default number of rows fetched per batch
pub const DEFAULT_EXPORT_BATCH_SIZE: usize = 100;

/// Per-domain data source of one logical index.
///
/// Batches must be ascending by row id with an exclusive lower bound, so
/// that passing the last id of one batch as `last_processed_id` yields the
/// next one. A batch shorter than requested means the source is exhausted.
pub trait Index {
    /// Logical index name, e.g. `product`
    fn name(&self) -> &str;

    fn total_count(&self) -> Result<u64>;

    /// Up to `batch_size` rows with id greater than `last_processed_id`
    fn export_data_for_batch(&self, last_processed_id: RowId, batch_size: usize) -> Result<ExportRows>;

    /// Rows for the given ids. Ids that no longer resolve are simply absent.
    fn export_data_for_ids(&self, ids: &[RowId]) -> Result<ExportRows>;

    fn export_batch_size(&self) -> usize {
        DEFAULT_EXPORT_BATCH_SIZE
    }

    /// Drop whatever the row source keeps between batches.
    fn clear_cache(&self) {}

    /// Toggle per-query logging of the row source.
    fn set_query_logging(&self, _enabled: bool) {}

    /// Current per-query logging state, restored after a full export.
    fn query_logging(&self) -> bool {
        true
    }

    /// Capability query for incremental export
    fn as_changes_only(&self) -> Option<&dyn SupportsChangesOnly> {
        None
    }
}

/// Optional capability: the source tracks which rows changed since the last export.
pub trait SupportsChangesOnly {
    fn changed_count(&self) -> Result<u64>;

    /// Up to `batch_size` changed ids greater than `last_processed_id`, ascending
    fn changed_ids_for_batch(&self, last_processed_id: RowId, batch_size: usize) -> Result<Vec<RowId>>;
}
