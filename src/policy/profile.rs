use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use crate::graph::collection::Collection;
use crate::graph::directory::EntityDirectory;
use crate::graph::entity::Entity;
use crate::graph::lineage::Segment;
use crate::graph::Readability;
use crate::policy::dictionary::TypeDictionary;
use crate::policy::errors::PolicyError;
use crate::policy::fields;
use crate::policy::id_list;
use crate::policy::scoped::UserScopedDirectory;
use crate::policy::types::{AuditConfig, EntityConfiguration, Permission, PermissionsRow, User, UserFactory};

/// Everything one user may do, per entity type. Ordered by principal.
#[derive(Debug, Clone)]
pub struct UserProfile {
    user: User,
    configurations: BTreeMap<String, EntityConfiguration>,
}

impl UserProfile {
    pub fn new(user: User, configurations: BTreeMap<String, EntityConfiguration>) -> Self {
        Self {
            user,
            configurations,
        }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn configuration(&self, entity_type: &str) -> Option<&EntityConfiguration> {
        self.configurations.get(entity_type)
    }

    pub fn configurations(&self) -> impl Iterator<Item = &EntityConfiguration> {
        self.configurations.values()
    }

    pub fn permitted_ids(&self, entity_type: &str, permission: Permission) -> &[String] {
        self.configuration(entity_type)
            .map(|c| c.ids_for(permission))
            .unwrap_or(&[])
    }

    pub fn has_access(&self, entity_type: &str, id: &str, permission: Permission) -> bool {
        self.configuration(entity_type)
            .map(|c| c.permits(permission, id))
            .unwrap_or(false)
    }

    fn restricted_fields<'c>(
        configuration: &'c EntityConfiguration,
        id: &str,
        permission: Permission,
    ) -> Option<&'c BTreeSet<String>> {
        match permission {
            Permission::Read => configuration.cannot_read.get(id),
            _ => configuration.cannot_write.get(id),
        }
    }

    /// Whether `field` of `entity_type#id` is not restricted for `permission`.
    pub fn can_access_field(
        &self,
        entity_type: &str,
        id: &str,
        field: &str,
        permission: Permission,
    ) -> bool {
        let Some(configuration) = self.configuration(entity_type) else {
            return false;
        };
        Self::restricted_fields(configuration, id, permission)
            .map(|restricted| !restricted.contains(field))
            .unwrap_or(true)
    }

    /// Fields of `entity` the user cannot see (READ) or change (other permissions).
    pub fn hidden_fields(&self, entity: &Entity, permission: Permission) -> BTreeSet<String> {
        let Some(configuration) = self.configuration(entity.entity_type()) else {
            return BTreeSet::new();
        };
        if !configuration.permits(permission, entity.id()) {
            return entity.field_names();
        }
        Self::restricted_fields(configuration, entity.id(), permission)
            .cloned()
            .unwrap_or_default()
    }

    /// Every ancestor entity readable and every nested collection field readable
    /// on its owner.
    fn path_readable<'s, I>(&self, segments: I) -> bool
    where
        I: IntoIterator<Item = &'s Segment>,
    {
        let mut owner: Option<(&str, &str)> = None;
        for segment in segments {
            match segment {
                Segment::Entity { entity_type, id } => {
                    if !self.has_access(entity_type, id, Permission::Read) {
                        return false;
                    }
                    owner = Some((entity_type.as_str(), id.as_str()));
                }
                Segment::Collection {
                    field_name,
                    is_root,
                } => {
                    if !is_root {
                        match owner {
                            Some((t, i)) if self.can_access_field(t, i, field_name, Permission::Read) => {}
                            _ => return false,
                        }
                    }
                    owner = None;
                }
            }
        }
        true
    }

    pub fn can_read_collection(&self, collection: &Collection) -> bool {
        if collection.is_root() {
            return true;
        }
        let own = collection.segment();
        self.path_readable(collection.lineage().segments().iter().chain(std::iter::once(&own)))
    }

    /// Parent collection readable and `permission` granted on the record.
    pub fn can_access_entity(&self, entity: &Entity, permission: Permission) -> bool {
        self.path_readable(entity.lineage().segments())
            && self.has_access(entity.entity_type(), entity.id(), permission)
    }
}

impl Readability for UserProfile {
    fn can_read_collection(&self, collection: &Collection) -> bool {
        UserProfile::can_read_collection(self, collection)
    }

    fn can_read_entity(&self, entity: &Entity) -> bool {
        self.can_access_entity(entity, Permission::Read)
    }
}

impl PartialEq for UserProfile {
    fn eq(&self, other: &Self) -> bool {
        self.user.principal == other.user.principal
    }
}

impl Eq for UserProfile {}

impl PartialOrd for UserProfile {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UserProfile {
    fn cmp(&self, other: &Self) -> Ordering {
        self.user.principal.cmp(&other.user.principal)
    }
}

impl std::fmt::Display for UserProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.user.alias, self.user.principal)
    }
}

/// Build one profile per configured user, in configuration order.
pub fn build_profiles(
    config: &AuditConfig,
    global: &EntityDirectory<'_>,
    dictionary: &TypeDictionary,
    users: &dyn UserFactory,
) -> Result<Vec<UserProfile>, PolicyError> {
    let mut profiles = Vec::with_capacity(config.users.len());
    for alias in &config.users {
        let rows: Vec<&PermissionsRow> = config.rows_for(alias).collect();
        let mut scoped = UserScopedDirectory::new(rows.iter().copied(), global, dictionary);

        let mut configurations: BTreeMap<String, EntityConfiguration> = BTreeMap::new();
        for row in rows {
            let configuration = row_configuration(row, &mut scoped, global, dictionary)?;
            match configurations.entry(row.entity_type.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(configuration);
                }
                Entry::Occupied(mut slot) => slot.get_mut().merge_with(configuration)?,
            }
        }

        info!(user = %alias, types = configurations.len(), "Built user profile");
        profiles.push(UserProfile::new(users.make_user(alias), configurations));
    }
    Ok(profiles)
}

fn row_configuration<'g>(
    row: &PermissionsRow,
    scoped: &mut UserScopedDirectory<'_, 'g>,
    global: &EntityDirectory<'g>,
    dictionary: &TypeDictionary,
) -> Result<EntityConfiguration, PolicyError> {
    let expr = id_list::parse_id_list(&row.valid_ids_expression)?;
    let ids = id_list::evaluate(&expr, &row.entity_type, scoped, global, dictionary)?;

    let read = fields::restricted_fields(&row.read_restricted_fields, &row.entity_type, dictionary)?;
    let mut write =
        fields::restricted_fields(&row.write_restricted_fields, &row.entity_type, dictionary)?;
    write.extend(read.iter().cloned());

    let mut configuration = EntityConfiguration::new(&row.entity_type);
    for permission in &row.permissions {
        configuration
            .permitted_ids
            .entry(*permission)
            .or_default()
            .extend(ids.iter().map(str::to_string));
    }
    for id in ids.iter() {
        configuration.cannot_read.insert(id.to_string(), read.clone());
        configuration.cannot_write.insert(id.to_string(), write.clone());
    }
    Ok(configuration)
}
