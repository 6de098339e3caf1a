//! Write-request builder registry

use crate::column::WriteRequestBuilder;
use crate::error::Result;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::debug;

/// Builders keyed by `"<database>.<retention_policy>"`, created on first use
/// and kept for the rest of the run.
///
/// Owned by a single dispatcher; concurrent imports need one registry each.
#[derive(Debug, Default)]
pub struct BuilderRegistry {
    builders: HashMap<String, WriteRequestBuilder>,
}

impl BuilderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(database: &str, retention_policy: &str) -> String {
        format!("{}.{}", database, retention_policy)
    }

    pub fn get_or_create(
        &mut self,
        database: &str,
        retention_policy: &str,
    ) -> Result<&mut WriteRequestBuilder> {
        match self.builders.entry(Self::key(database, retention_policy)) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let builder = WriteRequestBuilder::new(database, retention_policy)?;
                debug!(key = %entry.key(), "Created write request builder");
                Ok(entry.insert(builder))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_are_cached_per_key() {
        let mut registry = BuilderRegistry::new();
        registry.get_or_create("db", "autogen").unwrap();
        registry.get_or_create("db", "autogen").unwrap();
        assert_eq!(registry.len(), 1);

        let builder = registry.get_or_create("db", "weekly").unwrap();
        assert_eq!(builder.retention_policy(), "weekly");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_missing_database_is_not_cached() {
        let mut registry = BuilderRegistry::new();
        assert!(registry.get_or_create("", "autogen").is_err());
        assert!(registry.is_empty());
    }
}
