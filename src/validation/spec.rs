use std::borrow::Cow;
use std::collections::BTreeSet;

use tracing::debug;

use crate::graph::collection::Collection;
use crate::graph::entity::Entity;
use crate::graph::resource::{Linkage, Resource};
use crate::policy::profile::UserProfile;
use crate::policy::types::Permission;
use crate::validation::endpoint::{Method, Payload, Status};
use crate::validation::{CheckKind, Mutability, RelationshipOp, Validation, Visibility};

/// A check described against graph nodes, not yet resolved into a request.
#[derive(Debug, Clone)]
pub enum ValidationSpec<'g> {
    CollectionContents {
        collection: &'g Collection,
        expected: Status,
        expected_ids: BTreeSet<String>,
    },
    /// Sentinel entities are owned; crawled ones are borrowed.
    EntityVisibility {
        entity: Cow<'g, Entity>,
        expected: Status,
    },
    EntryCreate {
        entity: &'g Entity,
        expected: Status,
    },
    AttributeVisibility {
        entity: &'g Entity,
        attribute: String,
        visibility: Visibility,
    },
    AttributeMutability {
        entity: &'g Entity,
        attribute: String,
        mutability: Mutability,
    },
    Relationship {
        entity: &'g Entity,
        op: RelationshipOp,
        relationship: String,
        relationship_visibility: Visibility,
        linkage: Linkage,
        resources: Visibility,
    },
    Deletability {
        entity: &'g Entity,
        expected: Status,
    },
}

impl<'g> ValidationSpec<'g> {
    pub fn expected(&self) -> Status {
        match self {
            ValidationSpec::CollectionContents { expected, .. }
            | ValidationSpec::EntityVisibility { expected, .. }
            | ValidationSpec::EntryCreate { expected, .. }
            | ValidationSpec::Deletability { expected, .. } => *expected,
            ValidationSpec::AttributeVisibility { .. } => Status::Ok,
            ValidationSpec::AttributeMutability { mutability, .. } => match mutability {
                Mutability::Mutable => Status::NoContent,
                Mutability::Immutable => Status::Forbidden,
            },
            ValidationSpec::Relationship {
                op,
                relationship_visibility,
                resources,
                ..
            } => relationship_status(*op, *relationship_visibility, *resources),
        }
    }

    /// Resolve into a request for `profile`. Entries without a serialized
    /// form cannot be created and yield `None`.
    pub fn materialize(&self, profile: &UserProfile) -> Option<Validation> {
        let user = profile.user().clone();
        let expected = self.expected();
        let validation = match self {
            ValidationSpec::CollectionContents {
                collection,
                expected_ids,
                ..
            } => {
                let owner = collection
                    .owning_entity()
                    .map(|(t, i)| format!("{t}/{i}"))
                    .unwrap_or_default();
                let state = if expected.is_success() {
                    let ids: Vec<&str> = expected_ids.iter().map(String::as_str).collect();
                    format!("Visible=[{}]", ids.join(","))
                } else {
                    "Hidden".to_string()
                };
                let kind = CheckKind::CollectionContents {
                    expected_ids: expected_ids.clone(),
                };
                Validation::new(
                    format!("{}:{owner}/{}:{state}", kind.rule_name(), collection.field_name()),
                    user,
                    kind,
                    Method::Get,
                    collection.path(),
                    expected,
                    None,
                )
            }
            ValidationSpec::EntityVisibility { entity, .. } => {
                let kind = CheckKind::EntityVisibility;
                Validation::new(
                    located_id(&kind, entity),
                    user,
                    kind,
                    Method::Get,
                    entity.path(),
                    expected,
                    None,
                )
            }
            ValidationSpec::EntryCreate { entity, .. } => {
                if entity.is_sentinel() {
                    debug!(entity = %entity, path = %entity.path(), "No serialized form, skipping create");
                    return None;
                }
                let kind = CheckKind::EntryCreate {
                    expected_view: view(entity, profile, false),
                };
                Validation::new(
                    located_id(&kind, entity),
                    user,
                    kind,
                    Method::Post,
                    entity.collection_path(),
                    expected,
                    Some(Payload::Resource(view(entity, profile, true))),
                )
            }
            ValidationSpec::AttributeVisibility {
                entity,
                attribute,
                visibility,
            } => {
                let state = match visibility {
                    Visibility::Visible => "Visible",
                    Visibility::NotVisible => "Hidden",
                };
                let kind = CheckKind::AttributeVisibility {
                    attribute: attribute.clone(),
                    visibility: *visibility,
                };
                Validation::new(
                    format!("{}{state}={attribute}", entity_id(&kind, entity)),
                    user,
                    kind,
                    Method::Get,
                    entity.path(),
                    expected,
                    None,
                )
            }
            ValidationSpec::AttributeMutability {
                entity,
                attribute,
                mutability,
            } => {
                let state = match mutability {
                    Mutability::Mutable => "Mutable",
                    Mutability::Immutable => "Immutable",
                };
                let kind = CheckKind::AttributeMutability {
                    attribute: attribute.clone(),
                    mutability: *mutability,
                };
                Validation::new(
                    format!("{}{state}={attribute}", entity_id(&kind, entity)),
                    user,
                    kind,
                    Method::Patch,
                    entity.path(),
                    expected,
                    Some(Payload::Resource(single_attribute(entity, attribute))),
                )
            }
            ValidationSpec::Relationship {
                entity,
                op,
                relationship,
                linkage,
                resources,
                ..
            } => {
                let state = if expected.is_success() { "Permitted" } else { "Denied" };
                let kind = CheckKind::Relationship {
                    op: *op,
                    relationship: relationship.clone(),
                    linkage: linkage.clone(),
                    resources: *resources,
                };
                let (method, payload) = match op {
                    RelationshipOp::Read => (Method::Get, None),
                    RelationshipOp::Create => (Method::Patch, Some(Payload::Linkage(linkage.clone()))),
                    RelationshipOp::Delete => {
                        let to_one = entity
                            .relationships()
                            .get(relationship)
                            .map(|l| l.is_to_one())
                            .unwrap_or(true);
                        let method = if to_one { Method::Patch } else { Method::Delete };
                        (method, Some(Payload::Linkage(linkage.clone())))
                    }
                };
                Validation::new(
                    format!(
                        "{}/relationships/{relationship}:{state}=[{}]",
                        entity_id(&kind, entity),
                        linkage.ids().join(",")
                    ),
                    user,
                    kind,
                    method,
                    format!("{}/relationships/{relationship}", entity.path()),
                    expected,
                    payload,
                )
            }
            ValidationSpec::Deletability { entity, .. } => {
                let kind = CheckKind::Deletability;
                Validation::new(
                    located_id(&kind, entity),
                    user,
                    kind,
                    Method::Delete,
                    entity.path(),
                    expected,
                    None,
                )
            }
        };
        Some(validation)
    }
}

fn relationship_status(op: RelationshipOp, relationship: Visibility, resources: Visibility) -> Status {
    match op {
        RelationshipOp::Read => match relationship {
            Visibility::Visible => Status::Ok,
            Visibility::NotVisible => Status::NotFound,
        },
        RelationshipOp::Create | RelationshipOp::Delete => match (relationship, resources) {
            (Visibility::Visible, Visibility::Visible) => Status::NoContent,
            _ => Status::Forbidden,
        },
    }
}

fn entity_id(kind: &CheckKind, entity: &Entity) -> String {
    format!("{}:{entity}", kind.rule_name())
}

fn located_id(kind: &CheckKind, entity: &Entity) -> String {
    format!("{}@{}", entity_id(kind, entity), entity.relevant_path())
}

/// The entity as `profile` sees it: read-restricted fields removed (plus
/// write-restricted ones when `writable`) and linkage limited to readable ids.
fn view(entity: &Entity, profile: &UserProfile, writable: bool) -> Resource {
    let mut hidden = profile.hidden_fields(entity, Permission::Read);
    if writable {
        hidden.extend(profile.hidden_fields(entity, Permission::Update));
    }
    let mut resource = entity.to_resource();
    resource.attributes.retain(|name, _| !hidden.contains(name));
    resource.relationships.retain(|name, _| !hidden.contains(name));
    for linkage in resource.relationships.values_mut() {
        *linkage = linkage.filtered(|i| profile.has_access(&i.resource_type, &i.id, Permission::Read));
    }
    resource
}

fn single_attribute(entity: &Entity, attribute: &str) -> Resource {
    let mut resource = entity.to_resource();
    resource.attributes.retain(|name, _| name == attribute);
    resource.relationships.clear();
    resource
}
