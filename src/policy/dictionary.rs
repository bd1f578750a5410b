use std::collections::{BTreeMap, BTreeSet};

use crate::graph::directory::EntityDirectory;
use crate::policy::errors::PolicyError;
use crate::policy::types::SchemaDeclaration;

/// Declared fields of one entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityTypeDef {
    pub attributes: BTreeSet<String>,
    /// relationship -> target type, when known
    pub relationships: BTreeMap<String, Option<String>>,
}

impl EntityTypeDef {
    pub fn field_names(&self) -> BTreeSet<String> {
        self.attributes
            .iter()
            .chain(self.relationships.keys())
            .cloned()
            .collect()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.attributes.contains(field) || self.relationships.contains_key(field)
    }
}

/// Field names per entity type.
#[derive(Debug, Clone, Default)]
pub struct TypeDictionary {
    types: BTreeMap<String, EntityTypeDef>,
}

impl TypeDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Infer declared fields from every crawled entity.
    pub fn from_directory(directory: &EntityDirectory<'_>) -> Self {
        let mut dictionary = Self::new();
        for entity_type in directory.types() {
            let def = dictionary.types.entry(entity_type.to_string()).or_default();
            for entity in directory.entities_of_type(entity_type) {
                def.attributes.extend(entity.attributes().keys().cloned());
                for (name, linkage) in entity.relationships() {
                    let target = def.relationships.entry(name.clone()).or_default();
                    if target.is_none() {
                        *target = linkage
                            .identifiers()
                            .first()
                            .map(|i| i.resource_type.clone())
                            .or_else(|| {
                                entity
                                    .collection(name)
                                    .map(|c| c.entity_type().to_string())
                                    .filter(|t| !t.is_empty())
                            });
                    }
                }
            }
        }
        dictionary
    }

    /// Merge an explicit declaration; declared targets win over inferred ones.
    pub fn declare(&mut self, schema: &SchemaDeclaration) {
        let def = self.types.entry(schema.entity_type.clone()).or_default();
        def.attributes.extend(schema.attributes.iter().cloned());
        for (name, target) in &schema.relationships {
            def.relationships.insert(name.clone(), Some(target.clone()));
        }
    }

    pub fn contains(&self, entity_type: &str) -> bool {
        self.types.contains_key(entity_type)
    }

    pub fn get(&self, entity_type: &str) -> Result<&EntityTypeDef, PolicyError> {
        self.types
            .get(entity_type)
            .ok_or_else(|| PolicyError::UnknownType(entity_type.to_string()))
    }

    pub fn field_names(&self, entity_type: &str) -> Result<BTreeSet<String>, PolicyError> {
        Ok(self.get(entity_type)?.field_names())
    }

    /// Target type of `entity_type.relationship`; `None` when never observed.
    pub fn relationship_target(
        &self,
        entity_type: &str,
        relationship: &str,
    ) -> Result<Option<&str>, PolicyError> {
        let def = self.get(entity_type)?;
        def.relationships
            .get(relationship)
            .map(|t| t.as_deref())
            .ok_or_else(|| PolicyError::UnknownRelationship {
                entity_type: entity_type.to_string(),
                relationship: relationship.to_string(),
            })
    }
}
