use std::path::Path;

use authz_audit::fixtures::FixtureStore;
use authz_audit::graph::resource::{Linkage, Resource, ResourceIdentifier};
use authz_audit::policy::loader::load_audit_config;
use authz_audit::policy::types::AuditConfig;
use serde_json::Value;
use tempfile::TempDir;

/// Builder for snapshot resources
pub struct ResourceBuilder {
    resource: Resource,
}

impl ResourceBuilder {
    pub fn new(resource_type: &str, id: &str) -> Self {
        Self {
            resource: Resource::new(resource_type, id),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.resource.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn with_to_many(mut self, relationship: &str, target_type: &str, ids: &[&str]) -> Self {
        let identifiers = ids
            .iter()
            .map(|id| ResourceIdentifier::new(target_type, id))
            .collect();
        self.resource
            .relationships
            .insert(relationship.to_string(), Linkage::ToMany(identifiers));
        self
    }

    pub fn with_to_one(mut self, relationship: &str, target: Option<(&str, &str)>) -> Self {
        let identifier = target.map(|(t, id)| ResourceIdentifier::new(t, id));
        self.resource
            .relationships
            .insert(relationship.to_string(), Linkage::ToOne(identifier));
        self
    }

    pub fn build(self) -> Resource {
        self.resource
    }
}

/// Builder for fixture stores
#[derive(Default)]
pub struct SnapshotBuilder {
    store: FixtureStore,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, resource: ResourceBuilder) -> Self {
        self.store.insert(resource.build());
        self
    }

    pub fn build(self) -> FixtureStore {
        self.store
    }
}

/// Two parents and three children.
///
/// Parent 1 has children 1 and 2 and is married to parent 2. Child 4 is an
/// orphan.
pub fn family() -> FixtureStore {
    SnapshotBuilder::new()
        .with(
            ResourceBuilder::new("parent", "1")
                .with_attribute("firstName", "Mo")
                .with_attribute("age", 40)
                .with_to_many("children", "child", &["1", "2"])
                .with_to_one("spouse", Some(("parent", "2"))),
        )
        .with(
            ResourceBuilder::new("parent", "2")
                .with_attribute("firstName", "Margery")
                .with_attribute("age", 38)
                .with_to_many("children", "child", &[])
                .with_to_one("spouse", None),
        )
        .with(
            ResourceBuilder::new("child", "1")
                .with_attribute("firstName", "Bonnie")
                .with_to_many("parents", "parent", &["1"]),
        )
        .with(
            ResourceBuilder::new("child", "2")
                .with_attribute("firstName", "Cleo")
                .with_to_many("parents", "parent", &["1"]),
        )
        .with(
            ResourceBuilder::new("child", "4")
                .with_attribute("firstName", "Dot")
                .with_to_many("parents", "parent", &[]),
        )
        .build()
}

/// Audit configuration written to a temporary KDL file.
pub struct KdlConfig {
    _dir: TempDir,
    pub config: AuditConfig,
}

impl KdlConfig {
    pub fn load(source: &str) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("audit.kdl");
        std::fs::write(&path, source).expect("Failed to write audit config");
        let config = load_audit_config(Path::new(&path)).expect("Failed to load audit config");
        Self { _dir: dir, config }
    }
}

/// Exposes the family types. Admin sees everything, Mo sees parent 1 and
/// the children reachable from it plus child 4.
pub const FAMILY_KDL: &str = r#"
expose "parent" rootable=#true
expose "child" rootable=#true

schema "parent" {
    attributes "firstName" "age"
    relationship "children" type="child"
    relationship "spouse" type="parent"
}
schema "child" {
    attributes "firstName"
    relationship "parents" type="parent"
}

users "Admin" "Mo"

alias "Everyone" "[All]"

permission user="Admin" entity="parent" ids="Everyone" grants="CREATE, READ, UPDATE, DELETE"
permission user="Admin" entity="child" ids="Everyone" grants="create,read,update,delete"

permission user="Mo" entity="parent" ids="1" grants="READ"
permission user="Mo" entity="child" ids="[parent.children], 4" grants="READ"
"#;
