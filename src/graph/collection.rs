use std::collections::BTreeMap;

use crate::graph::entity::Entity;
use crate::graph::errors::GraphError;
use crate::graph::lineage::{Lineage, Segment};
use crate::graph::resource::Resource;

/// A root collection or a relationship field of an entity.
#[derive(Debug, Clone)]
pub struct Collection {
    lineage: Lineage,
    field_name: String,
    is_root: bool,
    entity_type: String,
    members: Option<BTreeMap<String, Entity>>,
}

impl Collection {
    pub fn root(field_name: &str) -> Self {
        Self {
            lineage: Lineage::root(),
            field_name: field_name.to_string(),
            is_root: true,
            entity_type: field_name.to_string(),
            members: None,
        }
    }

    /// `entity_type` may be empty when the linkage names no target.
    pub(crate) fn nested(lineage: Lineage, field_name: &str, entity_type: &str) -> Self {
        Self {
            lineage,
            field_name: field_name.to_string(),
            is_root: false,
            entity_type: entity_type.to_string(),
            members: None,
        }
    }

    /// Fill the collection from fetched resources. Allowed once.
    pub fn populate(&mut self, resources: Vec<Resource>) -> Result<(), GraphError> {
        if self.members.is_some() {
            return Err(GraphError::AlreadyPopulated(self.path()));
        }
        if let Some(first) = resources.first() {
            self.entity_type = first.resource_type.clone();
        }
        let member_lineage = self.lineage.extended(self.segment());
        let members = resources
            .into_iter()
            .map(|r| (r.id.clone(), Entity::from_resource(member_lineage.clone(), r)))
            .collect();
        self.members = Some(members);
        Ok(())
    }

    pub fn is_populated(&self) -> bool {
        self.members.is_some()
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    /// Type of the members. Roots are named after their type; nested
    /// collections take it from the linkage or the first member, and stay
    /// empty when neither names one.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn lineage(&self) -> &Lineage {
        &self.lineage
    }

    pub fn segment(&self) -> Segment {
        Segment::Collection {
            field_name: self.field_name.clone(),
            is_root: self.is_root,
        }
    }

    pub fn path(&self) -> String {
        format!("{}/{}", self.lineage.path(), self.field_name)
    }

    /// The entity owning this relationship field; `None` for root collections.
    pub fn owning_entity(&self) -> Option<(&str, &str)> {
        match self.lineage.parent()? {
            Segment::Entity { entity_type, id } => Some((entity_type.as_str(), id.as_str())),
            Segment::Collection { .. } => None,
        }
    }

    /// Members in id order.
    pub fn members(&self) -> impl Iterator<Item = &Entity> {
        self.members.iter().flat_map(|m| m.values())
    }

    pub(crate) fn members_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.members.iter_mut().flat_map(|m| m.values_mut())
    }

    pub fn member_ids(&self) -> Vec<&str> {
        self.members().map(Entity::id).collect()
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.members.as_ref().and_then(|m| m.get(id))
    }

    pub fn len(&self) -> usize {
        self.members.as_ref().map(BTreeMap::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A never-persisted member used to check not-found handling.
    pub fn sentinel_entity(&self, id: &str) -> Entity {
        self.sentinel_entity_of_type(&self.entity_type, id)
    }

    /// Sentinel for a collection whose member type was resolved elsewhere.
    pub fn sentinel_entity_of_type(&self, entity_type: &str, id: &str) -> Entity {
        Entity::sentinel(self.lineage.extended(self.segment()), entity_type, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_populate_once() {
        let mut parents = Collection::root("parent");
        assert!(!parents.is_populated());
        parents
            .populate(vec![Resource::new("parent", "2"), Resource::new("parent", "1")])
            .unwrap();
        assert_eq!(parents.entity_type(), "parent");
        assert_eq!(parents.member_ids(), vec!["1", "2"]);
        assert_eq!(parents.get("1").unwrap().path(), "/parent/1");

        let err = parents.populate(vec![]).unwrap_err();
        assert!(matches!(err, GraphError::AlreadyPopulated(p) if p == "/parent"));
    }

    #[test]
    fn test_empty_root_collection_is_typed_by_name() {
        let mut parents = Collection::root("parent");
        parents.populate(vec![]).unwrap();
        assert!(parents.is_populated());
        assert!(parents.is_empty());
        assert_eq!(parents.entity_type(), "parent");
    }

    #[test]
    fn test_empty_nested_collection_has_no_type() {
        let mut children = Collection::nested(Lineage::root(), "children", "");
        children.populate(vec![]).unwrap();
        assert_eq!(children.entity_type(), "");

        let sentinel = children.sentinel_entity_of_type("child", "7");
        assert_eq!(sentinel.entity_type(), "child");
        assert!(sentinel.is_sentinel());
    }

    #[test]
    fn test_sentinel_entity_lives_in_collection() {
        let mut parents = Collection::root("parent");
        parents.populate(vec![Resource::new("parent", "1")]).unwrap();
        let sentinel = parents.sentinel_entity("2");
        assert!(sentinel.is_sentinel());
        assert_eq!(sentinel.path(), "/parent/2");
        assert_eq!(sentinel.lineage().depth(), 1);
        assert!(parents.get("2").is_none());
    }
}
