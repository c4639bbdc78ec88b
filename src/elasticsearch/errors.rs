//! Error conditions callers need to tell apart
//!
//! Everything in the crate returns `anyhow::Result`. The enums below are the
//! cases that carry meaning beyond their message: they travel inside the
//! `anyhow::Error` and are recovered with `downcast_ref` where a caller
//! reacts to them (e.g. the legacy alias fallback in `migrate`).

use std::path::PathBuf;
use thiserror::Error;

/// Mapping definition file problems. Always fatal.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("Index definition file not found or unreadable: {path}")]
    Missing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Index definition file is not valid JSON: {path}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Lookup and construction errors of the index registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Index \"{0}\" is not registered")]
    IndexNotFound(String),

    #[error("Index \"{0}\" is registered more than once")]
    DuplicateIndex(String),
}

/// Failures reported by the search engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Alias \"{0}\" does not exist")]
    NoAlias(String),

    #[error("Index \"{0}\" already exists")]
    IndexAlreadyExists(String),

    #[error("Index \"{0}\" does not exist")]
    IndexNotFound(String),

    #[error("{operation} failed with HTTP {status}: {body}")]
    Request {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("Bulk request on \"{index}\" failed for {failed} item(s): {reasons}")]
    BulkFailure {
        index: String,
        failed: usize,
        reasons: String,
    },

    #[error("Reindex from \"{source_index}\" to \"{target_index}\" reported failures: {reasons}")]
    ReindexFailure {
        source_index: String,
        target_index: String,
        reasons: String,
    },
}

impl EngineError {
    /// True when the error means the alias is simply not there.
    pub fn is_no_alias(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<EngineError>(), Some(EngineError::NoAlias(_)))
    }
}
