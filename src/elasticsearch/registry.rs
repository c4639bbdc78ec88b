//! Name → index lookup, built once by the composition root

use anyhow::Result;
use std::collections::HashMap;

use super::errors::RegistryError;
use super::index::Index;

/// All indexes known to this process, in registration order.
pub struct IndexRegistry {
    indexes: Vec<Box<dyn Index>>,
    by_name: HashMap<String, usize>,
}

impl IndexRegistry {
    /// Build the registry. Registering the same name twice is an error.
    pub fn new(indexes: Vec<Box<dyn Index>>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(indexes.len());
        for (position, index) in indexes.iter().enumerate() {
            if by_name.insert(index.name().to_string(), position).is_some() {
                return Err(RegistryError::DuplicateIndex(index.name().to_string()).into());
            }
        }

        Ok(Self { indexes, by_name })
    }

    pub fn is_index_registered(&self, index_name: &str) -> bool {
        self.by_name.contains_key(index_name)
    }

    pub fn index_by_name(&self, index_name: &str) -> Result<&dyn Index> {
        match self.by_name.get(index_name) {
            Some(&position) => Ok(self.indexes[position].as_ref()),
            None => Err(RegistryError::IndexNotFound(index_name.to_string()).into()),
        }
    }

    pub fn registered_index_names(&self) -> Vec<&str> {
        self.indexes.iter().map(|index| index.name()).collect()
    }

    pub fn registered_indexes(&self) -> impl Iterator<Item = &dyn Index> {
        self.indexes.iter().map(|index| index.as_ref())
    }

    /// One named index, or every registered index when `index_name` is None
    pub fn select(&self, index_name: Option<&str>) -> Result<Vec<&dyn Index>> {
        match index_name {
            Some(name) => Ok(vec![self.index_by_name(name)?]),
            None => Ok(self.registered_indexes().collect()),
        }
    }
}
