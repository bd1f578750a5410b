use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::errors::AuditError;
use crate::graph::errors::GraphError;
use crate::graph::resource::{FetchResponse, Resource, ResourceFetcher};
use crate::validation::endpoint::{Endpoint, Method, OperationRequest, OperationResponse, Payload};
use crate::validation::errors::EndpointError;

/// A recorded dataset served with full visibility.
///
/// The snapshot is a JSON object mapping each entity type to its resources:
///
/// ```json
/// { "parent": [{ "type": "parent", "id": "1", "attributes": {},
///                "relationships": { "children": [{ "type": "child", "id": "1" }] } }] }
/// ```
///
/// Paths alternate ids and relationship names below a root type:
/// `/parent`, `/parent/1`, `/parent/1/children`, `/parent/1/children/1/friends`.
#[derive(Debug, Clone, Default)]
pub struct FixtureStore {
    by_type: BTreeMap<String, BTreeMap<String, Resource>>,
}

impl FixtureStore {
    pub fn load(path: &Path) -> Result<Self, AuditError> {
        let raw = std::fs::read_to_string(path)?;
        let snapshot: BTreeMap<String, Vec<Resource>> = serde_json::from_str(&raw)?;
        let store = Self::from_snapshot(snapshot).map_err(|message| AuditError::Fixture {
            path: path.display().to_string(),
            message,
        })?;
        info!(path = %path.display(), types = store.by_type.len(), "Loaded fixture snapshot");
        Ok(store)
    }

    /// Records must be listed under their own type.
    pub fn from_snapshot(snapshot: BTreeMap<String, Vec<Resource>>) -> Result<Self, String> {
        let mut by_type: BTreeMap<String, BTreeMap<String, Resource>> = BTreeMap::new();
        for (entity_type, resources) in snapshot {
            let records = by_type.entry(entity_type.clone()).or_default();
            for resource in resources {
                if resource.resource_type != entity_type {
                    return Err(format!(
                        "`{}#{}` is listed under `{entity_type}`",
                        resource.resource_type, resource.id
                    ));
                }
                records.insert(resource.id.clone(), resource);
            }
        }
        Ok(Self { by_type })
    }

    pub fn insert(&mut self, resource: Resource) {
        self.by_type
            .entry(resource.resource_type.clone())
            .or_default()
            .insert(resource.id.clone(), resource);
    }

    pub fn get(&self, entity_type: &str, id: &str) -> Option<&Resource> {
        self.by_type.get(entity_type).and_then(|r| r.get(id))
    }

    /// Resources reached by `path`, or `None` when any step does not exist.
    pub fn resolve(&self, path: &str) -> Option<Vec<&Resource>> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let (root, rest) = segments.split_first()?;
        let mut current: Vec<&Resource> = self.by_type.get(*root)?.values().collect();

        for step in rest.chunks(2) {
            let id = step[0];
            let resource = current.iter().copied().find(|r| r.id == id)?;
            let Some(relationship) = step.get(1) else {
                return Some(vec![resource]);
            };
            let linkage = resource.relationships.get(*relationship)?;
            current = linkage
                .identifiers()
                .into_iter()
                .filter_map(|i| {
                    let linked = self.get(&i.resource_type, &i.id);
                    if linked.is_none() {
                        warn!(%path, identifier = %i, "Dangling relationship in snapshot");
                    }
                    linked
                })
                .collect();
        }
        Some(current)
    }

    /// Linkage of `relationship` on the entity at `entity_path`, as bare
    /// identifier resources.
    fn relationship_linkage(&self, entity_path: &str, relationship: &str) -> Option<Vec<Resource>> {
        let found = self.resolve(entity_path)?;
        let linkage = found.first()?.relationships.get(relationship)?;
        Some(
            linkage
                .identifiers()
                .into_iter()
                .map(|i| Resource::new(&i.resource_type, &i.id))
                .collect(),
        )
    }

    fn exists(&self, path: &str) -> bool {
        match path.split_once("/relationships/") {
            Some((entity_path, relationship)) => {
                self.relationship_linkage(entity_path, relationship).is_some()
            }
            None => self.resolve(path).is_some(),
        }
    }
}

#[async_trait]
impl ResourceFetcher for FixtureStore {
    async fn fetch(&self, path: &str) -> Result<FetchResponse, GraphError> {
        Ok(match self.resolve(path) {
            Some(resources) => FetchResponse::ok(resources.into_iter().cloned().collect()),
            None => FetchResponse::status(404),
        })
    }
}

/// Serves the snapshot to every user without enforcing any policy. Writes
/// are acknowledged and never applied.
#[async_trait]
impl Endpoint for FixtureStore {
    async fn execute(&self, request: OperationRequest) -> Result<OperationResponse, EndpointError> {
        let path = request.path.as_str();
        let response = match (request.method, &request.payload) {
            (Method::Get, _) => {
                let found = match path.split_once("/relationships/") {
                    Some((entity_path, relationship)) => {
                        self.relationship_linkage(entity_path, relationship)
                    }
                    None => self
                        .resolve(path)
                        .map(|resources| resources.into_iter().cloned().collect()),
                };
                match found {
                    Some(resources) => OperationResponse::with_resources(200, resources),
                    None => OperationResponse::with_status(404),
                }
            }
            (Method::Post, Some(Payload::Resource(resource))) => {
                OperationResponse::with_resources(201, vec![resource.clone()])
            }
            (Method::Post, _) => OperationResponse {
                status: 400,
                resources: Vec::new(),
                message: Some("create requires a resource payload".into()),
            },
            (Method::Patch | Method::Delete, _) if self.exists(path) => {
                OperationResponse::with_status(204)
            }
            (Method::Patch | Method::Delete, _) => OperationResponse::with_status(404),
        };
        Ok(response)
    }
}
