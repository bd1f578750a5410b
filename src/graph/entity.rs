use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::graph::collection::Collection;
use crate::graph::errors::GraphError;
use crate::graph::lineage::{Lineage, Segment};
use crate::graph::resource::{Linkage, Resource};

/// A crawled record, or a sentinel synthesized to check not-found behavior.
#[derive(Debug, Clone)]
pub struct Entity {
    lineage: Lineage,
    entity_type: String,
    id: String,
    attributes: BTreeMap<String, Value>,
    relationships: BTreeMap<String, Linkage>,
    collections: BTreeMap<String, Collection>,
    sentinel: bool,
}

impl Entity {
    pub(crate) fn from_resource(lineage: Lineage, resource: Resource) -> Self {
        let own = lineage.extended(Segment::Entity {
            entity_type: resource.resource_type.clone(),
            id: resource.id.clone(),
        });
        let collections = resource
            .relationships
            .iter()
            .map(|(name, linkage)| {
                let target = linkage
                    .identifiers()
                    .first()
                    .map(|i| i.resource_type.as_str())
                    .unwrap_or_default();
                (name.clone(), Collection::nested(own.clone(), name, target))
            })
            .collect();

        Self {
            lineage,
            entity_type: resource.resource_type,
            id: resource.id,
            attributes: resource.attributes,
            relationships: resource.relationships,
            collections,
            sentinel: false,
        }
    }

    pub(crate) fn sentinel(lineage: Lineage, entity_type: &str, id: &str) -> Self {
        Self {
            lineage,
            entity_type: entity_type.to_string(),
            id: id.to_string(),
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
            collections: BTreeMap::new(),
            sentinel: true,
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn lineage(&self) -> &Lineage {
        &self.lineage
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    pub fn relationships(&self) -> &BTreeMap<String, Linkage> {
        &self.relationships
    }

    /// Relationship collections in field-name order.
    pub fn collections(&self) -> impl Iterator<Item = &Collection> {
        self.collections.values()
    }

    pub(crate) fn collections_mut(&mut self) -> impl Iterator<Item = &mut Collection> {
        self.collections.values_mut()
    }

    pub fn collection(&self, relationship: &str) -> Option<&Collection> {
        self.collections.get(relationship)
    }

    pub fn is_sentinel(&self) -> bool {
        self.sentinel
    }

    /// False when the entity already appears among its own ancestors.
    pub fn is_cycle_free(&self) -> bool {
        !self.lineage.contains_entity(&self.entity_type, &self.id)
    }

    pub fn segment(&self) -> Segment {
        Segment::Entity {
            entity_type: self.entity_type.clone(),
            id: self.id.clone(),
        }
    }

    pub fn path(&self) -> String {
        format!("{}/{}", self.lineage.path(), self.id)
    }

    /// Path of the collection this entity belongs to.
    pub fn collection_path(&self) -> String {
        self.lineage.path()
    }

    /// Short path used in validation ids: `ptype/pid/field/id`, or `/field/id` at the root.
    pub fn relevant_path(&self) -> String {
        let field = self
            .lineage
            .parent()
            .map(Segment::path_part)
            .unwrap_or_default();
        match self.lineage.owning_entity() {
            Some((parent_type, parent_id)) => {
                format!("{parent_type}/{parent_id}/{field}/{}", self.id)
            }
            None => format!("/{field}/{}", self.id),
        }
    }

    pub fn field_names(&self) -> BTreeSet<String> {
        self.attributes
            .keys()
            .chain(self.relationships.keys())
            .cloned()
            .collect()
    }

    /// The entities linked through `relationship`, as crawled.
    pub fn relationship_members(&self, relationship: &str) -> Result<Vec<&Entity>, GraphError> {
        let collection =
            self.collections
                .get(relationship)
                .ok_or_else(|| GraphError::UnknownRelationship {
                    entity: format!("{}#{}", self.entity_type, self.id),
                    relationship: relationship.to_string(),
                })?;
        Ok(collection.members().collect())
    }

    pub fn to_resource(&self) -> Resource {
        Resource {
            resource_type: self.entity_type.clone(),
            id: self.id.clone(),
            attributes: self.attributes.clone(),
            relationships: self.relationships.clone(),
        }
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.entity_type == other.entity_type && self.id == other.id
    }
}

impl Eq for Entity {}

impl PartialOrd for Entity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entity {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.entity_type, &self.id).cmp(&(&other.entity_type, &other.id))
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.entity_type, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::resource::ResourceIdentifier;
    use serde_json::json;

    fn root_lineage(field: &str) -> Lineage {
        Lineage::root().extended(Segment::Collection {
            field_name: field.into(),
            is_root: true,
        })
    }

    fn parent(id: &str) -> Resource {
        let mut r = Resource::new("parent", id);
        r.attributes.insert("firstName".into(), json!("Mo"));
        r.relationships.insert(
            "children".into(),
            Linkage::ToMany(vec![ResourceIdentifier::new("child", "1")]),
        );
        r
    }

    #[test]
    fn test_from_resource_creates_relationship_collections() {
        let entity = Entity::from_resource(root_lineage("parent"), parent("1"));
        assert_eq!(entity.path(), "/parent/1");
        let children = entity.collection("children").unwrap();
        assert_eq!(children.path(), "/parent/1/children");
        assert_eq!(children.entity_type(), "child");
        assert!(!children.is_root());
        assert_eq!(
            entity.field_names().into_iter().collect::<Vec<_>>(),
            vec!["children", "firstName"]
        );
    }

    #[test]
    fn test_relevant_path() {
        let root = Entity::from_resource(root_lineage("parent"), parent("1"));
        assert_eq!(root.relevant_path(), "/parent/1");

        let nested = Entity::sentinel(
            root.collection("children").unwrap().lineage().extended(Segment::Collection {
                field_name: "children".into(),
                is_root: false,
            }),
            "child",
            "7",
        );
        assert_eq!(nested.relevant_path(), "parent/1/children/7");
    }

    #[test]
    fn test_cycle_detection() {
        let lineage = root_lineage("parent")
            .extended(Segment::Entity {
                entity_type: "parent".into(),
                id: "1".into(),
            })
            .extended(Segment::Collection {
                field_name: "friends".into(),
                is_root: false,
            });
        assert!(!Entity::from_resource(lineage.clone(), parent("1")).is_cycle_free());
        assert!(Entity::from_resource(lineage, parent("2")).is_cycle_free());
    }

    #[test]
    fn test_unknown_relationship_members() {
        let entity = Entity::from_resource(root_lineage("parent"), parent("1"));
        assert!(entity.relationship_members("children").unwrap().is_empty());
        assert!(matches!(
            entity.relationship_members("spouse"),
            Err(GraphError::UnknownRelationship { .. })
        ));
    }

    #[test]
    fn test_equality_by_type_and_id() {
        let a = Entity::from_resource(root_lineage("parent"), parent("1"));
        let b = Entity::sentinel(root_lineage("other"), "parent", "1");
        assert_eq!(a, b);
    }
}
