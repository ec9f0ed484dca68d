use std::collections::HashSet;

use ledgerkeep_common::{Error, Result};
use serde::Serialize;

/// A versioned schema change owned by one entity.
///
/// Versions identify a change within its entity. They are not used for
/// ordering: definitions run in the order they were registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationDefinition {
    pub entity: String,
    pub version: u32,
    pub statement: String,
}

impl MigrationDefinition {
    pub fn new(entity: impl Into<String>, version: u32, statement: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            version,
            statement: statement.into(),
        }
    }
}

/// Ordered set of migrations contributed by the entity modules.
///
/// Built by the host before the migrator runs and only read afterwards.
#[derive(Debug, Default)]
pub struct MigrationRegistry {
    definitions: Vec<MigrationDefinition>,
    seen: HashSet<(String, u32)>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one definition. Registering the same `(entity, version)` twice
    /// is an error, so a statement can never be scheduled twice.
    pub fn register(
        &mut self,
        entity: impl Into<String>,
        version: u32,
        statement: impl Into<String>,
    ) -> Result<()> {
        self.push(MigrationDefinition::new(entity, version, statement))
    }

    /// Append every definition in order, stopping at the first duplicate.
    pub fn extend(
        &mut self,
        definitions: impl IntoIterator<Item = MigrationDefinition>,
    ) -> Result<()> {
        for definition in definitions {
            self.push(definition)?;
        }
        Ok(())
    }

    /// Build a registry from each entity's definitions, entity by entity.
    pub fn from_entities(
        entities: impl IntoIterator<Item = Vec<MigrationDefinition>>,
    ) -> Result<Self> {
        let mut registry = Self::new();
        for definitions in entities {
            registry.extend(definitions)?;
        }
        Ok(registry)
    }

    /// All definitions, in registration order.
    pub fn definitions(&self) -> &[MigrationDefinition] {
        &self.definitions
    }

    /// Distinct entity names, in the order they first registered.
    pub fn entities(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for definition in &self.definitions {
            if !names.contains(&definition.entity.as_str()) {
                names.push(&definition.entity);
            }
        }
        names
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    fn push(&mut self, definition: MigrationDefinition) -> Result<()> {
        if !self
            .seen
            .insert((definition.entity.clone(), definition.version))
        {
            return Err(Error::DuplicateMigration {
                entity: definition.entity,
                version: definition.version,
            });
        }
        self.definitions.push(definition);
        Ok(())
    }
}
