use std::collections::BTreeMap;

use crate::graph::entity::Entity;
use crate::graph::{EntityGraph, GraphNode, Visitor};

/// Every crawled entity, indexed by type then id.
#[derive(Debug, Default)]
pub struct EntityDirectory<'g> {
    by_type: BTreeMap<String, BTreeMap<String, &'g Entity>>,
}

impl<'g> EntityDirectory<'g> {
    pub fn from_graph(graph: &'g EntityGraph) -> Self {
        let mut directory = Self::default();
        graph.walk(&mut directory, None);
        directory
    }

    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.by_type.keys().map(String::as_str)
    }

    pub fn contains_type(&self, entity_type: &str) -> bool {
        self.by_type.contains_key(entity_type)
    }

    /// All known ids of `entity_type`, in id order.
    pub fn ids_of_type(&self, entity_type: &str) -> Vec<&str> {
        self.by_type
            .get(entity_type)
            .map(|m| m.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn entities_of_type(&self, entity_type: &str) -> Vec<&'g Entity> {
        self.by_type
            .get(entity_type)
            .map(|m| m.values().copied().collect())
            .unwrap_or_default()
    }

    /// Entities of `entity_type` whose id is accepted by `keep`.
    pub fn filtered_entities_of_type<F>(&self, entity_type: &str, keep: F) -> Vec<&'g Entity>
    where
        F: Fn(&str) -> bool,
    {
        self.by_type
            .get(entity_type)
            .map(|m| {
                m.iter()
                    .filter(|(id, _)| keep(id))
                    .map(|(_, e)| *e)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get(&self, entity_type: &str, id: &str) -> Option<&'g Entity> {
        self.by_type.get(entity_type)?.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.by_type.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'g> Visitor<'g> for EntityDirectory<'g> {
    fn visit(&mut self, node: GraphNode<'g>) {
        if let GraphNode::Entity(entity) = node {
            self.by_type
                .entry(entity.entity_type().to_string())
                .or_default()
                .entry(entity.id().to_string())
                .or_insert(entity);
        }
    }
}
