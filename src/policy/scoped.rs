use std::collections::HashMap;

use tracing::debug;

use crate::graph::directory::EntityDirectory;
use crate::graph::entity::Entity;
use crate::policy::dictionary::TypeDictionary;
use crate::policy::errors::PolicyError;
use crate::policy::id_list::{self, ScopedEntities};
use crate::policy::types::{IdSet, PermissionsRow};

/// Resolution state of one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisitState {
    Unvisited,
    Visiting,
    Visited(IdSet),
}

/// The ids one user can reach, per type, computed on demand from that user's
/// rows. Not shared between users.
pub struct UserScopedDirectory<'a, 'g> {
    global: &'a EntityDirectory<'g>,
    dictionary: &'a TypeDictionary,
    expressions: HashMap<String, Vec<String>>,
    states: HashMap<String, VisitState>,
    stack: Vec<String>,
}

impl<'a, 'g> UserScopedDirectory<'a, 'g> {
    pub fn new<'r, I>(rows: I, global: &'a EntityDirectory<'g>, dictionary: &'a TypeDictionary) -> Self
    where
        I: IntoIterator<Item = &'r PermissionsRow>,
    {
        let mut expressions: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            expressions
                .entry(row.entity_type.clone())
                .or_default()
                .push(row.valid_ids_expression.clone());
        }
        Self {
            global,
            dictionary,
            expressions,
            states: HashMap::new(),
            stack: Vec::new(),
        }
    }

    pub fn state(&self, entity_type: &str) -> &VisitState {
        self.states
            .get(entity_type)
            .unwrap_or(&VisitState::Unvisited)
    }

    /// Ids of `entity_type` reachable by this user, in first-seen order.
    pub fn ids_of_type(&mut self, entity_type: &str) -> Result<IdSet, PolicyError> {
        match self.states.get(entity_type) {
            Some(VisitState::Visited(ids)) => {
                debug!(entity = %entity_type, "Scoped ids cached");
                return Ok(ids.clone());
            }
            Some(VisitState::Visiting) => {
                let mut path = self.stack.clone();
                path.push(entity_type.to_string());
                return Err(PolicyError::CyclicDependency(path.join(" -> ")));
            }
            _ => {}
        }
        let Some(expressions) = self.expressions.get(entity_type).cloned() else {
            return Ok(IdSet::new());
        };

        self.states
            .insert(entity_type.to_string(), VisitState::Visiting);
        self.stack.push(entity_type.to_string());
        let resolved = self.expand(entity_type, &expressions);
        self.stack.pop();

        match resolved {
            Ok(ids) => {
                debug!(entity = %entity_type, ids = ids.len(), "Resolved scoped ids");
                self.states
                    .insert(entity_type.to_string(), VisitState::Visited(ids.clone()));
                Ok(ids)
            }
            Err(err) => {
                self.states.remove(entity_type);
                Err(err)
            }
        }
    }

    fn expand(&mut self, entity_type: &str, expressions: &[String]) -> Result<IdSet, PolicyError> {
        let global = self.global;
        let dictionary = self.dictionary;
        let mut ids = IdSet::new();
        for expression in expressions {
            let parsed = id_list::parse_id_list(expression)?;
            let expanded = id_list::evaluate(&parsed, entity_type, &mut *self, global, dictionary)?;
            ids.extend(expanded.iter());
        }
        Ok(ids)
    }
}

impl<'a, 'g> ScopedEntities<'g> for UserScopedDirectory<'a, 'g> {
    fn entities_of_type(&mut self, entity_type: &str) -> Result<Vec<&'g Entity>, PolicyError> {
        let ids = self.ids_of_type(entity_type)?;
        Ok(self
            .global
            .filtered_entities_of_type(entity_type, |id| ids.contains(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::collection::Collection;
    use crate::graph::resource::{Linkage, Resource, ResourceIdentifier};
    use crate::graph::EntityGraph;
    use crate::policy::types::Permission;

    fn row(entity_type: &str, ids: &str) -> PermissionsRow {
        PermissionsRow {
            user_alias: "Mo".into(),
            entity_type: entity_type.into(),
            valid_ids_expression: ids.into(),
            permissions: vec![Permission::Read],
            read_restricted_fields: String::new(),
            write_restricted_fields: String::new(),
        }
    }

    fn linked(entity_type: &str, id: &str, rel: &str, target: &str, ids: &[&str]) -> Resource {
        let mut r = Resource::new(entity_type, id);
        r.relationships.insert(
            rel.into(),
            Linkage::ToMany(ids.iter().map(|i| ResourceIdentifier::new(target, i)).collect()),
        );
        r
    }

    /// parent 1 owns children 1 and 2; child 1 lists parent 1.
    fn family() -> EntityGraph {
        let mut parents = Collection::root("parent");
        parents
            .populate(vec![
                linked("parent", "1", "children", "child", &["1", "2"]),
                linked("parent", "2", "children", "child", &[]),
            ])
            .unwrap();
        for entity in parents.members_mut() {
            let owns = entity.id() == "1";
            for children in entity.collections_mut() {
                let members = if owns {
                    vec![
                        linked("child", "1", "parents", "parent", &["1"]),
                        linked("child", "2", "parents", "parent", &["1"]),
                    ]
                } else {
                    vec![]
                };
                children.populate(members).unwrap();
            }
        }
        let mut children = Collection::root("child");
        children
            .populate(vec![
                linked("child", "1", "parents", "parent", &["1"]),
                linked("child", "2", "parents", "parent", &["1"]),
                linked("child", "4", "parents", "parent", &[]),
            ])
            .unwrap();
        for entity in children.members_mut() {
            let parents_of = entity.relationships()["parents"].ids().len();
            for parents in entity.collections_mut() {
                let members = if parents_of > 0 {
                    vec![linked("parent", "1", "children", "child", &["1", "2"])]
                } else {
                    vec![]
                };
                parents.populate(members).unwrap();
            }
        }
        EntityGraph::new(vec![parents, children])
    }

    #[test]
    fn test_subcollection_expansion() {
        let graph = family();
        let global = EntityDirectory::from_graph(&graph);
        let dictionary = TypeDictionary::from_directory(&global);
        let rows = vec![row("child", "[parent.children], 4"), row("parent", "1")];
        let mut scoped = UserScopedDirectory::new(&rows, &global, &dictionary);

        assert_eq!(scoped.state("child"), &VisitState::Unvisited);
        let ids = scoped.ids_of_type("child").unwrap();
        assert_eq!(ids.iter().collect::<Vec<_>>(), vec!["1", "2", "4"]);
        assert!(matches!(scoped.state("child"), VisitState::Visited(_)));
        assert!(matches!(scoped.state("parent"), VisitState::Visited(_)));

        let again = scoped.ids_of_type("child").unwrap();
        assert_eq!(ids, again);
    }

    #[test]
    fn test_unconfigured_type_is_empty() {
        let graph = family();
        let global = EntityDirectory::from_graph(&graph);
        let dictionary = TypeDictionary::from_directory(&global);
        let rows = vec![row("parent", "1")];
        let mut scoped = UserScopedDirectory::new(&rows, &global, &dictionary);
        assert!(scoped.entities_of_type("child").unwrap().is_empty());
    }

    #[test]
    fn test_entities_filtered_through_global() {
        let graph = family();
        let global = EntityDirectory::from_graph(&graph);
        let dictionary = TypeDictionary::from_directory(&global);
        let rows = vec![row("parent", "1, 99")];
        let mut scoped = UserScopedDirectory::new(&rows, &global, &dictionary);
        let entities = scoped.entities_of_type("parent").unwrap();
        assert_eq!(entities.iter().map(|e| e.id()).collect::<Vec<_>>(), vec!["1"]);
    }

    #[test]
    fn test_mutual_dependency_is_cyclic_in_any_order() {
        let graph = family();
        let global = EntityDirectory::from_graph(&graph);
        let dictionary = TypeDictionary::from_directory(&global);
        let rows = vec![
            row("child", "[parent.children]"),
            row("parent", "[child.parents]"),
        ];

        let mut scoped = UserScopedDirectory::new(&rows, &global, &dictionary);
        let err = scoped.ids_of_type("child").unwrap_err();
        assert!(matches!(err, PolicyError::CyclicDependency(ref p) if p == "child -> parent -> child"));

        let mut scoped = UserScopedDirectory::new(&rows, &global, &dictionary);
        let err = scoped.ids_of_type("parent").unwrap_err();
        assert!(matches!(err, PolicyError::CyclicDependency(_)));
    }

    #[test]
    fn test_grammar_error_is_not_reported_as_cycle() {
        let graph = family();
        let global = EntityDirectory::from_graph(&graph);
        let dictionary = TypeDictionary::from_directory(&global);
        let rows = vec![row("child", "[parent.children], 4"), row("parent", "[parent")];
        let mut scoped = UserScopedDirectory::new(&rows, &global, &dictionary);

        let err = scoped.ids_of_type("child").unwrap_err();
        assert!(matches!(err, PolicyError::InvalidIdList { .. }));
        assert_eq!(scoped.state("child"), &VisitState::Unvisited);
        assert_eq!(scoped.state("parent"), &VisitState::Unvisited);

        let err = scoped.ids_of_type("parent").unwrap_err();
        assert!(matches!(err, PolicyError::InvalidIdList { .. }));
        let err = scoped.ids_of_type("child").unwrap_err();
        assert!(matches!(err, PolicyError::InvalidIdList { .. }));
    }
}
