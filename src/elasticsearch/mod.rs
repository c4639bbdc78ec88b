//! Search index synchronization
//!
//! Keeps Elasticsearch-compatible indices in step with a relational source:
//!
//! - [`IndexDefinition`] names a logical index and derives its alias and
//!   content-hash versioned physical name from the mapping file
//! - [`Index`] is the per-domain row source, optionally
//!   [`SupportsChangesOnly`]
//! - [`IndexRegistry`] maps names to row sources
//! - [`IndexRepository`] talks to the engine
//! - [`IndexFacade`] runs create / export / migrate / delete
//! - [`ExportScope`] collects ids touched during a request and flushes them
//!   once at the end
//!
//! # Example
//!
//! ```no_run
//! use index_sync::elasticsearch::{IndexDefinitionLoader, IndexFacade, InMemoryRepository};
//!
//! let loader = IndexDefinitionLoader::new("resources/definition", "shop");
//! let facade = IndexFacade::new(InMemoryRepository::new());
//!
//! let definition = loader.index_definition("product");
//! facade.create(&definition)?;
//! println!("alias {} -> {}", definition.index_alias(), definition.versioned_index_name()?);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod definition;
pub mod errors;
pub mod events;
pub mod facade;
pub mod index;
pub mod registry;
pub mod repository;
pub mod scheduler;

pub use definition::{IndexDefinition, IndexDefinitionLoader};
pub use errors::{DefinitionError, EngineError, RegistryError};
pub use events::{IndexExportedEvent, IndexExportedListener};
pub use facade::{ExportReport, IndexFacade, IndexStatus, MigrationOutcome};
pub use index::{Document, ExportRows, Index, RowId, SupportsChangesOnly, DEFAULT_EXPORT_BATCH_SIZE};
pub use registry::IndexRegistry;
pub use repository::{ElasticsearchRepository, InMemoryRepository, IndexRepository, Operation};
pub use scheduler::{ExportScheduler, ExportScope};
