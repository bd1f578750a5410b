use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::policy::errors::PolicyError;

/// The four operations a row can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Permission {
    Create,
    Read,
    Update,
    Delete,
}

impl FromStr for Permission {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CREATE" => Ok(Permission::Create),
            "READ" => Ok(Permission::Read),
            "UPDATE" => Ok(Permission::Update),
            "DELETE" => Ok(Permission::Delete),
            other => Err(PolicyError::InvalidConfig(format!(
                "unknown permission `{other}` (expected CREATE, READ, UPDATE or DELETE)"
            ))),
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Permission::Create => "CREATE",
            Permission::Read => "READ",
            Permission::Update => "UPDATE",
            Permission::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// Parse `READ,UPDATE` style permission lists.
pub fn parse_permissions(s: &str) -> Result<Vec<Permission>, PolicyError> {
    s.split(',')
        .filter(|p| !p.trim().is_empty())
        .map(Permission::from_str)
        .collect()
}

/// One policy row: what `user_alias` may do with which ids of `entity_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionsRow {
    pub user_alias: String,
    pub entity_type: String,
    pub valid_ids_expression: String,
    pub permissions: Vec<Permission>,
    pub read_restricted_fields: String,
    pub write_restricted_fields: String,
}

/// An entity type served by the system under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposedEntity {
    pub entity_type: String,
    pub rootable: bool,
}

/// Explicit field declarations for a type, merged over what the crawl infers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDeclaration {
    pub entity_type: String,
    pub attributes: Vec<String>,
    /// relationship name -> target type
    pub relationships: Vec<(String, String)>,
}

/// Parsed audit configuration.
#[derive(Debug, Clone, Default)]
pub struct AuditConfig {
    pub exposed: Vec<ExposedEntity>,
    pub schemas: Vec<SchemaDeclaration>,
    pub users: Vec<String>,
    /// alias -> expanded comma-separated terms
    pub aliases: BTreeMap<String, String>,
    pub rows: Vec<PermissionsRow>,
    pub disabled: BTreeSet<String>,
}

impl AuditConfig {
    pub fn rootable_types(&self) -> Vec<String> {
        self.exposed
            .iter()
            .filter(|e| e.rootable)
            .map(|e| e.entity_type.clone())
            .collect()
    }

    pub fn rows_for<'a>(&'a self, user_alias: &'a str) -> impl Iterator<Item = &'a PermissionsRow> {
        self.rows.iter().filter(move |r| r.user_alias == user_alias)
    }
}

/// Insertion-ordered set of ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdSet {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl IdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.to_string());
        self.order.push(id.to_string());
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.order
    }
}

impl<'a> Extend<&'a str> for IdSet {
    fn extend<T: IntoIterator<Item = &'a str>>(&mut self, iter: T) {
        for id in iter {
            self.insert(id);
        }
    }
}

impl<'a> FromIterator<&'a str> for IdSet {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        let mut set = IdSet::new();
        set.extend(iter);
        set
    }
}

/// A user as the system under test knows it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct User {
    pub alias: String,
    /// Opaque principal handed to the endpoint.
    pub principal: String,
}

/// Maps configured aliases onto principals of the system under test.
pub trait UserFactory: Send + Sync {
    fn make_user(&self, alias: &str) -> User;
}

/// Uses the alias itself as the principal.
#[derive(Debug, Clone, Copy, Default)]
pub struct AliasUserFactory;

impl UserFactory for AliasUserFactory {
    fn make_user(&self, alias: &str) -> User {
        User {
            alias: alias.to_string(),
            principal: alias.to_string(),
        }
    }
}

/// Resolved permissions of one user over one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityConfiguration {
    pub entity_type: String,
    pub permitted_ids: BTreeMap<Permission, Vec<String>>,
    pub cannot_read: BTreeMap<String, BTreeSet<String>>,
    pub cannot_write: BTreeMap<String, BTreeSet<String>>,
}

impl EntityConfiguration {
    pub fn new(entity_type: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            permitted_ids: BTreeMap::new(),
            cannot_read: BTreeMap::new(),
            cannot_write: BTreeMap::new(),
        }
    }

    pub fn ids_for(&self, permission: Permission) -> &[String] {
        self.permitted_ids
            .get(&permission)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn permits(&self, permission: Permission, id: &str) -> bool {
        self.ids_for(permission).iter().any(|i| i == id)
    }

    /// Fold `other` into `self`. Id lists append; a record may only be
    /// restricted once.
    pub fn merge_with(&mut self, other: EntityConfiguration) -> Result<(), PolicyError> {
        if self.entity_type != other.entity_type {
            return Err(PolicyError::MismatchedMerge {
                left: self.entity_type.clone(),
                right: other.entity_type,
            });
        }
        for (permission, ids) in other.permitted_ids {
            self.permitted_ids.entry(permission).or_default().extend(ids);
        }
        merge_restrictions(&self.entity_type, &mut self.cannot_read, other.cannot_read)?;
        merge_restrictions(&self.entity_type, &mut self.cannot_write, other.cannot_write)?;
        Ok(())
    }
}

fn merge_restrictions(
    entity_type: &str,
    into: &mut BTreeMap<String, BTreeSet<String>>,
    from: BTreeMap<String, BTreeSet<String>>,
) -> Result<(), PolicyError> {
    for (id, fields) in from {
        if into.contains_key(&id) {
            return Err(PolicyError::DuplicateRestrictedFields {
                entity_type: entity_type.to_string(),
                id,
            });
        }
        into.insert(id, fields);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(entity_type: &str, ids: &[&str], restricted: &[(&str, &[&str])]) -> EntityConfiguration {
        let mut c = EntityConfiguration::new(entity_type);
        c.permitted_ids.insert(
            Permission::Read,
            ids.iter().map(|s| s.to_string()).collect(),
        );
        for (id, fields) in restricted {
            c.cannot_read.insert(
                id.to_string(),
                fields.iter().map(|s| s.to_string()).collect(),
            );
        }
        c
    }

    #[test]
    fn test_parse_permissions() {
        assert_eq!(
            parse_permissions("read, Update,DELETE").unwrap(),
            vec![Permission::Read, Permission::Update, Permission::Delete]
        );
        assert!(parse_permissions("").unwrap().is_empty());
        assert!(parse_permissions("READ,SHARE").is_err());
    }

    #[test]
    fn test_merge_appends_ids() {
        let mut a = config("child", &["1"], &[("1", &["age"])]);
        a.merge_with(config("child", &["2"], &[("2", &["age"])])).unwrap();
        assert_eq!(a.ids_for(Permission::Read), ["1", "2"]);
        assert!(a.permits(Permission::Read, "2"));
        assert!(!a.permits(Permission::Update, "2"));
        assert_eq!(a.cannot_read.len(), 2);
    }

    #[test]
    fn test_merge_rejects_duplicate_restrictions() {
        let mut a = config("child", &["1"], &[("1", &["age"])]);
        let err = a
            .merge_with(config("child", &["1"], &[("1", &["firstName"])]))
            .unwrap_err();
        assert!(matches!(err, PolicyError::DuplicateRestrictedFields { .. }));
    }

    #[test]
    fn test_merge_rejects_other_type() {
        let mut a = config("child", &[], &[]);
        let err = a.merge_with(config("parent", &[], &[])).unwrap_err();
        assert!(matches!(err, PolicyError::MismatchedMerge { .. }));
    }

    #[test]
    fn test_id_set_keeps_insertion_order() {
        let mut ids: IdSet = ["4", "1"].into_iter().collect();
        ids.extend(["1", "2"]);
        assert_eq!(ids.iter().collect::<Vec<_>>(), vec!["4", "1", "2"]);
        assert!(ids.contains("2"));
        assert_eq!(ids.len(), 3);
    }
}
