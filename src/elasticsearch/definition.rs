//! Index definitions and their content-hash versioning
//!
//! A definition names one logical index and points at its mapping file:
//!
//! ```text
//! {definitions_directory}/
//! └── {index_name}/
//!     └── 1.json        # settings + mappings payload, sent verbatim on create
//! ```
//!
//! The physical index name is `{alias}_{hash}` where the hash covers the
//! parsed mapping. Changing the mapping changes the physical name, which is
//! what `IndexFacade::migrate` keys on.

use anyhow::Result;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use super::errors::DefinitionError;

/// File name of the mapping inside each index directory
const DEFINITION_FILE: &str = "1.json";

/// One logical index: name, alias and versioned physical name.
///
/// Cheap to construct; the mapping file is read only when
/// [`definition`](Self::definition) or
/// [`versioned_index_name`](Self::versioned_index_name) is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    index_name: String,
    definitions_directory: PathBuf,
    index_prefix: String,
}

impl IndexDefinition {
    pub fn new(
        index_name: impl Into<String>,
        definitions_directory: impl Into<PathBuf>,
        index_prefix: impl Into<String>,
    ) -> Self {
        Self {
            index_name: index_name.into(),
            definitions_directory: definitions_directory.into(),
            index_prefix: index_prefix.into(),
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn index_prefix(&self) -> &str {
        &self.index_prefix
    }

    /// Stable name readers query: `{prefix}_{index_name}` or `{index_name}`
    pub fn index_alias(&self) -> String {
        if self.index_prefix.is_empty() {
            self.index_name.clone()
        } else {
            format!("{}_{}", self.index_prefix, self.index_name)
        }
    }

    /// Alias under the older naming convention (prefix glued on without a separator)
    pub fn legacy_index_alias(&self) -> String {
        format!("{}{}", self.index_prefix, self.index_name)
    }

    /// Path of the mapping file: `{definitions_directory}/{index_name}/1.json`
    pub fn definition_path(&self) -> PathBuf {
        self.definitions_directory
            .join(&self.index_name)
            .join(DEFINITION_FILE)
    }

    /// Load and parse the mapping file.
    ///
    /// Missing or malformed files are configuration errors
    /// ([`DefinitionError`]), never something to retry.
    pub fn definition(&self) -> Result<Value> {
        let path = self.definition_path();
        let content = read_definition(&path)?;
        let value = serde_json::from_str(&content)
            .map_err(|source| DefinitionError::Invalid { path, source })?;
        Ok(value)
    }

    /// Physical index name: `{alias}_{sha256 of the mapping}`
    pub fn versioned_index_name(&self) -> Result<String> {
        let definition = self.definition()?;
        Ok(format!("{}_{}", self.index_alias(), definition_hash(&definition)))
    }
}

fn read_definition(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| {
        DefinitionError::Missing {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}

/// Hash of the canonical serialization of a parsed definition.
///
/// Key order and whitespace in the file do not affect the result; any change
/// of a value does.
pub fn definition_hash(definition: &Value) -> String {
    let digest = Sha256::digest(canonical_json(definition).as_bytes());
    format!("{:x}", digest)
}

/// Compact JSON with object keys sorted bytewise at every level.
///
/// Sorted explicitly, independent of how `serde_json::Map` orders its keys
/// (insertion order once `preserve_order` is enabled anywhere in the build).
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));

            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Builds [`IndexDefinition`]s that share a directory and prefix.
#[derive(Debug, Clone)]
pub struct IndexDefinitionLoader {
    definitions_directory: PathBuf,
    index_prefix: String,
}

impl IndexDefinitionLoader {
    pub fn new(definitions_directory: impl Into<PathBuf>, index_prefix: impl Into<String>) -> Self {
        Self {
            definitions_directory: definitions_directory.into(),
            index_prefix: index_prefix.into(),
        }
    }

    /// Pure construction, no I/O happens here
    pub fn index_definition(&self, index_name: &str) -> IndexDefinition {
        IndexDefinition::new(
            index_name,
            self.definitions_directory.clone(),
            self.index_prefix.clone(),
        )
    }
}
