//! Resource graph crawled from the system under test.
//!
//! The graph is a forest of root collections. Each collection holds entities
//! sorted by id; each entity holds one collection per relationship field.
//! Relationship cycles are expected: the crawl stops at any entity that
//! already appears in its own lineage, and walks skip those entities too.

pub mod collection;
pub mod crawl;
pub mod directory;
pub mod entity;
pub mod errors;
pub mod lineage;
pub mod resource;

use collection::Collection;
use entity::Entity;

/// Any node a walk can visit.
#[derive(Debug, Clone, Copy)]
pub enum GraphNode<'g> {
    Graph(&'g EntityGraph),
    Collection(&'g Collection),
    Entity(&'g Entity),
}

/// Receives nodes in walk order.
pub trait Visitor<'g> {
    fn visit(&mut self, node: GraphNode<'g>);
}

/// Decides whether a walk may descend below a node.
pub trait Readability {
    fn can_read_collection(&self, collection: &Collection) -> bool;
    fn can_read_entity(&self, entity: &Entity) -> bool;
}

/// Immutable result of the crawl.
#[derive(Debug, Clone, Default)]
pub struct EntityGraph {
    roots: Vec<Collection>,
}

impl EntityGraph {
    pub fn new(mut roots: Vec<Collection>) -> Self {
        roots.sort_by(|a, b| a.field_name().cmp(b.field_name()));
        Self { roots }
    }

    /// Root collections sorted by field name.
    pub fn roots(&self) -> &[Collection] {
        &self.roots
    }

    pub fn root(&self, field_name: &str) -> Option<&Collection> {
        self.roots.iter().find(|c| c.field_name() == field_name)
    }

    /// Depth-first walk: roots in name order, members in id order, relationship
    /// collections in field order. With a `scope`, children of unreadable nodes
    /// are not visited.
    pub fn walk<'g, V>(&'g self, visitor: &mut V, scope: Option<&dyn Readability>)
    where
        V: Visitor<'g> + ?Sized,
    {
        visitor.visit(GraphNode::Graph(self));
        for root in &self.roots {
            walk_collection(root, visitor, scope);
        }
    }
}

fn walk_collection<'g, V>(collection: &'g Collection, visitor: &mut V, scope: Option<&dyn Readability>)
where
    V: Visitor<'g> + ?Sized,
{
    visitor.visit(GraphNode::Collection(collection));
    if let Some(scope) = scope {
        if !scope.can_read_collection(collection) {
            return;
        }
    }
    for entity in collection.members() {
        if entity.is_cycle_free() {
            walk_entity(entity, visitor, scope);
        }
    }
}

fn walk_entity<'g, V>(entity: &'g Entity, visitor: &mut V, scope: Option<&dyn Readability>)
where
    V: Visitor<'g> + ?Sized,
{
    visitor.visit(GraphNode::Entity(entity));
    if let Some(scope) = scope {
        if !scope.can_read_entity(entity) {
            return;
        }
    }
    for collection in entity.collections() {
        walk_collection(collection, visitor, scope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::resource::{Linkage, Resource, ResourceIdentifier};

    struct Recorder(Vec<String>);

    impl<'g> Visitor<'g> for Recorder {
        fn visit(&mut self, node: GraphNode<'g>) {
            match node {
                GraphNode::Graph(_) => self.0.push("graph".into()),
                GraphNode::Collection(c) => self.0.push(c.path()),
                GraphNode::Entity(e) => self.0.push(e.path()),
            }
        }
    }

    struct DenyEntity(&'static str);

    impl Readability for DenyEntity {
        fn can_read_collection(&self, _collection: &Collection) -> bool {
            true
        }
        fn can_read_entity(&self, entity: &Entity) -> bool {
            entity.id() != self.0
        }
    }

    fn graph() -> EntityGraph {
        let mut parent = Resource::new("parent", "1");
        parent.relationships.insert(
            "friends".into(),
            Linkage::ToMany(vec![ResourceIdentifier::new("parent", "1")]),
        );
        let mut parents = Collection::root("parent");
        parents.populate(vec![parent.clone()]).unwrap();
        for entity in parents.members_mut() {
            for friends in entity.collections_mut() {
                friends.populate(vec![parent.clone()]).unwrap();
            }
        }
        let mut children = Collection::root("child");
        children.populate(vec![Resource::new("child", "3")]).unwrap();
        EntityGraph::new(vec![parents, children])
    }

    #[test]
    fn test_walk_order_and_cycle_skip() {
        let graph = graph();
        let mut recorder = Recorder(Vec::new());
        graph.walk(&mut recorder, None);
        assert_eq!(
            recorder.0,
            vec![
                "graph",
                "/child",
                "/child/3",
                "/parent",
                "/parent/1",
                "/parent/1/friends",
            ]
        );
    }

    #[test]
    fn test_walk_respects_scope() {
        let graph = graph();
        let mut recorder = Recorder(Vec::new());
        graph.walk(&mut recorder, Some(&DenyEntity("1")));
        assert_eq!(
            recorder.0,
            vec!["graph", "/child", "/child/3", "/parent", "/parent/1"]
        );
    }
}
