use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::errors::GraphError;

/// Reference to a resource: `type` + `id`, as it appears in relationship linkage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
}

impl ResourceIdentifier {
    pub fn new(resource_type: &str, id: &str) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
        }
    }
}

impl std::fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.resource_type, self.id)
    }
}

/// Relationship data: a to-many list or an optional to-one reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Linkage {
    ToMany(Vec<ResourceIdentifier>),
    ToOne(Option<ResourceIdentifier>),
}

impl Default for Linkage {
    fn default() -> Self {
        Linkage::ToMany(Vec::new())
    }
}

impl Linkage {
    pub fn identifiers(&self) -> Vec<&ResourceIdentifier> {
        match self {
            Linkage::ToMany(ids) => ids.iter().collect(),
            Linkage::ToOne(id) => id.iter().collect(),
        }
    }

    pub fn ids(&self) -> Vec<&str> {
        self.identifiers().into_iter().map(|i| i.id.as_str()).collect()
    }

    pub fn is_to_one(&self) -> bool {
        matches!(self, Linkage::ToOne(_))
    }

    /// An empty to-one relationship (`data: null`).
    pub fn is_null(&self) -> bool {
        matches!(self, Linkage::ToOne(None))
    }

    /// Keep the identifiers accepted by `keep`, preserving the linkage shape.
    pub fn filtered<F>(&self, keep: F) -> Linkage
    where
        F: Fn(&ResourceIdentifier) -> bool,
    {
        match self {
            Linkage::ToMany(ids) => {
                Linkage::ToMany(ids.iter().filter(|i| keep(i)).cloned().collect())
            }
            Linkage::ToOne(id) => Linkage::ToOne(id.as_ref().filter(|i| keep(i)).cloned()),
        }
    }

    fn normalized(&self) -> Linkage {
        match self {
            Linkage::ToMany(ids) => {
                let mut ids = ids.clone();
                ids.sort();
                ids.dedup();
                Linkage::ToMany(ids)
            }
            Linkage::ToOne(id) => Linkage::ToOne(id.clone()),
        }
    }
}

/// A resource as served by the system under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default)]
    pub relationships: BTreeMap<String, Linkage>,
}

impl Resource {
    pub fn new(resource_type: &str, id: &str) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    pub fn identifier(&self) -> ResourceIdentifier {
        ResourceIdentifier::new(&self.resource_type, &self.id)
    }

    pub fn field_names(&self) -> BTreeSet<String> {
        self.attributes
            .keys()
            .chain(self.relationships.keys())
            .cloned()
            .collect()
    }

    /// Structural equality that ignores to-many ordering.
    pub fn same_view(&self, other: &Resource) -> bool {
        if self.identifier() != other.identifier() || self.attributes != other.attributes {
            return false;
        }
        if self.relationships.len() != other.relationships.len() {
            return false;
        }
        self.relationships.iter().all(|(name, linkage)| {
            other
                .relationships
                .get(name)
                .map(|theirs| theirs.normalized() == linkage.normalized())
                .unwrap_or(false)
        })
    }
}

/// Outcome of fetching a collection path.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub status: u16,
    pub resources: Vec<Resource>,
}

impl FetchResponse {
    pub fn ok(resources: Vec<Resource>) -> Self {
        Self {
            status: 200,
            resources,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            resources: Vec::new(),
        }
    }
}

/// Retrieval layer used to crawl the baseline graph with full visibility.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, path: &str) -> Result<FetchResponse, GraphError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_linkage_deserializes_both_shapes() {
        let many: Linkage = serde_json::from_value(json!([{"type": "child", "id": "1"}])).unwrap();
        assert_eq!(many.ids(), vec!["1"]);
        assert!(!many.is_to_one());

        let one: Linkage = serde_json::from_value(json!({"type": "parent", "id": "2"})).unwrap();
        assert!(one.is_to_one());
        assert_eq!(one.ids(), vec!["2"]);

        let null: Linkage = serde_json::from_value(json!(null)).unwrap();
        assert!(null.is_null());
        assert!(null.ids().is_empty());
    }

    #[test]
    fn test_filtered_keeps_shape() {
        let one = Linkage::ToOne(Some(ResourceIdentifier::new("parent", "2")));
        assert_eq!(one.filtered(|_| false), Linkage::ToOne(None));

        let many = Linkage::ToMany(vec![
            ResourceIdentifier::new("child", "1"),
            ResourceIdentifier::new("child", "2"),
        ]);
        assert_eq!(many.filtered(|i| i.id == "2").ids(), vec!["2"]);
    }

    #[test]
    fn test_same_view_ignores_to_many_order() {
        let mut a = Resource::new("parent", "1");
        a.relationships.insert(
            "children".into(),
            Linkage::ToMany(vec![
                ResourceIdentifier::new("child", "1"),
                ResourceIdentifier::new("child", "2"),
            ]),
        );
        let mut b = a.clone();
        b.relationships.insert(
            "children".into(),
            Linkage::ToMany(vec![
                ResourceIdentifier::new("child", "2"),
                ResourceIdentifier::new("child", "1"),
            ]),
        );
        assert!(a.same_view(&b));

        b.attributes.insert("firstName".into(), json!("Mo"));
        assert!(!a.same_view(&b));
    }
}
