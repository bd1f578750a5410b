use std::borrow::Cow;
use std::collections::BTreeSet;

use tracing::debug;

use crate::graph::collection::Collection;
use crate::graph::entity::Entity;
use crate::graph::resource::Linkage;
use crate::graph::{EntityGraph, GraphNode, Visitor};
use crate::policy::dictionary::TypeDictionary;
use crate::policy::profile::UserProfile;
use crate::policy::types::Permission;
use crate::validation::endpoint::Status;
use crate::validation::sentinel::SentinelIdStrategy;
use crate::validation::spec::ValidationSpec;
use crate::validation::{Mutability, RelationshipOp, Visibility};

/// Emits the checks one profile must pass, in walk order.
pub struct PlanGenerator<'p, 'g> {
    profile: &'p UserProfile,
    dictionary: &'p TypeDictionary,
    sentinels: &'p dyn SentinelIdStrategy,
    specs: Vec<ValidationSpec<'g>>,
}

impl<'p, 'g> PlanGenerator<'p, 'g> {
    pub fn new(
        profile: &'p UserProfile,
        dictionary: &'p TypeDictionary,
        sentinels: &'p dyn SentinelIdStrategy,
    ) -> Self {
        Self {
            profile,
            dictionary,
            sentinels,
            specs: Vec::new(),
        }
    }

    /// Walk `graph` within what `profile` can read.
    pub fn generate(
        graph: &'g EntityGraph,
        profile: &'p UserProfile,
        dictionary: &'p TypeDictionary,
        sentinels: &'p dyn SentinelIdStrategy,
    ) -> Vec<ValidationSpec<'g>> {
        let mut generator = Self::new(profile, dictionary, sentinels);
        graph.walk(&mut generator, Some(profile));
        generator.into_specs()
    }

    pub fn into_specs(self) -> Vec<ValidationSpec<'g>> {
        self.specs
    }

    /// 403 when the record is known to the user or sits in a root collection,
    /// 404 otherwise.
    fn failure_code(&self, entity: &Entity) -> Status {
        if self
            .profile
            .has_access(entity.entity_type(), entity.id(), Permission::Read)
            || entity.lineage().depth() == 1
        {
            Status::Forbidden
        } else {
            Status::NotFound
        }
    }

    /// Member type of `collection`, falling back to the declared target of
    /// the owning relationship when nothing was crawled.
    fn member_type(&self, collection: &Collection) -> String {
        if !collection.entity_type().is_empty() {
            return collection.entity_type().to_string();
        }
        let declared = collection.owning_entity().and_then(|(owner, _)| {
            self.dictionary
                .relationship_target(owner, collection.field_name())
                .ok()
                .flatten()
        });
        match declared {
            Some(target) => target.to_string(),
            None => {
                debug!(path = %collection.path(), "No member type for sentinel");
                String::new()
            }
        }
    }

    fn visit_collection(&mut self, collection: &'g Collection) {
        let sentinel = collection.sentinel_entity_of_type(
            &self.member_type(collection),
            &self.sentinels.sentinel_id(collection),
        );

        if !self.profile.can_read_collection(collection) {
            self.specs.push(ValidationSpec::CollectionContents {
                collection,
                expected: Status::Forbidden,
                expected_ids: BTreeSet::new(),
            });
            return;
        }

        let readable = collection
            .members()
            .filter(|m| self.profile.has_access(m.entity_type(), m.id(), Permission::Read))
            .map(|m| m.id().to_string())
            .collect();
        self.specs.push(ValidationSpec::CollectionContents {
            collection,
            expected: Status::Ok,
            expected_ids: readable,
        });

        let (visible, hidden) = self.partition(collection, Permission::Read);
        for entity in visible {
            self.specs.push(ValidationSpec::EntityVisibility {
                entity: Cow::Borrowed(entity),
                expected: Status::Ok,
            });
        }
        for entity in hidden {
            let expected = self.failure_code(entity);
            self.specs.push(ValidationSpec::EntityVisibility {
                entity: Cow::Borrowed(entity),
                expected,
            });
        }
        let expected = self.failure_code(&sentinel);
        self.specs.push(ValidationSpec::EntityVisibility {
            entity: Cow::Owned(sentinel),
            expected,
        });

        let (creatable, denied) = self.partition(collection, Permission::Create);
        for entity in creatable {
            self.specs.push(ValidationSpec::EntryCreate {
                entity,
                expected: Status::Created,
            });
        }
        for entity in denied {
            let expected = self.failure_code(entity);
            self.specs.push(ValidationSpec::EntryCreate { entity, expected });
        }
    }

    /// Members granted `permission`, then the rest; both in id order.
    fn partition(
        &self,
        collection: &'g Collection,
        permission: Permission,
    ) -> (Vec<&'g Entity>, Vec<&'g Entity>) {
        collection
            .members()
            .partition(|m| self.profile.has_access(m.entity_type(), m.id(), permission))
    }

    fn visit_entity(&mut self, entity: &'g Entity) {
        if !self.profile.can_access_entity(entity, Permission::Read) {
            self.specs.push(ValidationSpec::EntityVisibility {
                entity: Cow::Borrowed(entity),
                expected: Status::NotFound,
            });
            return;
        }

        let hidden = self.profile.hidden_fields(entity, Permission::Read);
        let (visible, concealed): (Vec<&String>, Vec<&String>) =
            entity.attributes().keys().partition(|a| !hidden.contains(*a));
        for (attributes, visibility) in [(visible, Visibility::Visible), (concealed, Visibility::NotVisible)] {
            for attribute in attributes {
                self.specs.push(ValidationSpec::AttributeVisibility {
                    entity,
                    attribute: attribute.clone(),
                    visibility,
                });
            }
        }

        let frozen = self.profile.hidden_fields(entity, Permission::Update);
        let (mutable, immutable): (Vec<&String>, Vec<&String>) =
            entity.attributes().keys().partition(|a| !frozen.contains(*a));
        for (attributes, mutability) in [(mutable, Mutability::Mutable), (immutable, Mutability::Immutable)] {
            for attribute in attributes {
                self.specs.push(ValidationSpec::AttributeMutability {
                    entity,
                    attribute: attribute.clone(),
                    mutability,
                });
            }
        }

        self.relationship_checks(entity, Permission::Read, RelationshipOp::Read);
        self.relationship_checks(entity, Permission::Update, RelationshipOp::Create);
        self.relationship_checks(entity, Permission::Update, RelationshipOp::Delete);

        let expected = if self.profile.can_access_entity(entity, Permission::Delete) {
            Status::NoContent
        } else {
            self.failure_code(entity)
        };
        self.specs.push(ValidationSpec::Deletability { entity, expected });
    }

    /// Unrestricted relationships split into readable and unreadable linkage;
    /// restricted ones are checked whole.
    fn relationship_checks(&mut self, entity: &'g Entity, permission: Permission, op: RelationshipOp) {
        let restricted = self.profile.hidden_fields(entity, permission);
        let (open, closed): (Vec<_>, Vec<_>) = entity
            .relationships()
            .iter()
            .partition(|(name, _)| !restricted.contains(*name));

        for (relationship, linkage) in open {
            let permitted = linkage.filtered(|i| self.readable(&i.resource_type, &i.id));
            let denied = linkage.filtered(|i| !self.readable(&i.resource_type, &i.id));
            if linkage.is_null() || !permitted.ids().is_empty() {
                self.push_relationship(entity, op, relationship, Visibility::Visible, permitted, Visibility::Visible);
            }
            if !denied.ids().is_empty() {
                self.push_relationship(entity, op, relationship, Visibility::Visible, denied, Visibility::NotVisible);
            }
        }
        for (relationship, linkage) in closed {
            self.push_relationship(
                entity,
                op,
                relationship,
                Visibility::NotVisible,
                linkage.clone(),
                Visibility::NotVisible,
            );
        }
    }

    fn readable(&self, entity_type: &str, id: &str) -> bool {
        self.profile.has_access(entity_type, id, Permission::Read)
    }

    fn push_relationship(
        &mut self,
        entity: &'g Entity,
        op: RelationshipOp,
        relationship: &str,
        relationship_visibility: Visibility,
        linkage: Linkage,
        resources: Visibility,
    ) {
        self.specs.push(ValidationSpec::Relationship {
            entity,
            op,
            relationship: relationship.to_string(),
            relationship_visibility,
            linkage,
            resources,
        });
    }
}

impl<'p, 'g> Visitor<'g> for PlanGenerator<'p, 'g> {
    fn visit(&mut self, node: GraphNode<'g>) {
        match node {
            GraphNode::Graph(_) => {}
            GraphNode::Collection(collection) => self.visit_collection(collection),
            GraphNode::Entity(entity) => self.visit_entity(entity),
        }
    }
}
