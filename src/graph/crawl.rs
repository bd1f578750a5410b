use std::future::Future;
use std::pin::Pin;

use tracing::{debug, info};

use crate::graph::collection::Collection;
use crate::graph::errors::GraphError;
use crate::graph::resource::ResourceFetcher;
use crate::graph::EntityGraph;

type CrawlFuture<'a> = Pin<Box<dyn Future<Output = Result<(), GraphError>> + Send + 'a>>;

/// Populate every root collection and, recursively, every relationship
/// collection of every cycle-free entity.
pub async fn crawl(
    root_fields: &[String],
    fetcher: &dyn ResourceFetcher,
) -> Result<EntityGraph, GraphError> {
    let mut roots: Vec<Collection> = root_fields.iter().map(|f| Collection::root(f)).collect();
    for root in roots.iter_mut() {
        populate(root, fetcher).await?;
    }
    let graph = EntityGraph::new(roots);
    info!(roots = graph.roots().len(), "Crawled baseline graph");
    Ok(graph)
}

fn populate<'a>(collection: &'a mut Collection, fetcher: &'a dyn ResourceFetcher) -> CrawlFuture<'a> {
    Box::pin(async move {
        let path = collection.path();
        let response = fetcher.fetch(&path).await?;
        if response.status != 200 {
            return Err(GraphError::Baseline {
                path,
                status: response.status,
            });
        }
        debug!(%path, members = response.resources.len(), "Fetched collection");
        collection.populate(response.resources)?;

        for entity in collection.members_mut() {
            if !entity.is_cycle_free() {
                continue;
            }
            for child in entity.collections_mut() {
                populate(child, fetcher).await?;
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::resource::{FetchResponse, Linkage, Resource, ResourceIdentifier};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MapFetcher {
        responses: HashMap<String, FetchResponse>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ResourceFetcher for MapFetcher {
        async fn fetch(&self, path: &str) -> Result<FetchResponse, GraphError> {
            self.calls.lock().unwrap().push(path.to_string());
            Ok(self
                .responses
                .get(path)
                .cloned()
                .unwrap_or_else(|| FetchResponse::ok(Vec::new())))
        }
    }

    fn friend_of(id: &str, friend: &str) -> Resource {
        let mut r = Resource::new("parent", id);
        r.relationships.insert(
            "friends".into(),
            Linkage::ToMany(vec![ResourceIdentifier::new("parent", friend)]),
        );
        r
    }

    #[tokio::test]
    async fn test_crawl_stops_at_cycles() {
        let mut responses = HashMap::new();
        responses.insert("/parent".to_string(), FetchResponse::ok(vec![friend_of("1", "2")]));
        responses.insert(
            "/parent/1/friends".to_string(),
            FetchResponse::ok(vec![friend_of("2", "1")]),
        );
        responses.insert(
            "/parent/1/friends/2/friends".to_string(),
            FetchResponse::ok(vec![friend_of("1", "2")]),
        );
        let fetcher = MapFetcher {
            responses,
            calls: Mutex::new(Vec::new()),
        };

        let graph = crawl(&["parent".to_string()], &fetcher).await.unwrap();
        assert_eq!(
            *fetcher.calls.lock().unwrap(),
            vec!["/parent", "/parent/1/friends", "/parent/1/friends/2/friends"]
        );

        let one = graph.root("parent").unwrap().get("1").unwrap();
        let two = one.collection("friends").unwrap().get("2").unwrap();
        let back = two.collection("friends").unwrap().get("1").unwrap();
        assert!(!back.is_cycle_free());
        assert!(!back.collection("friends").unwrap().is_populated());
    }

    #[tokio::test]
    async fn test_non_ok_status_fails_crawl() {
        let mut responses = HashMap::new();
        responses.insert("/parent".to_string(), FetchResponse::status(403));
        let fetcher = MapFetcher {
            responses,
            calls: Mutex::new(Vec::new()),
        };
        let err = crawl(&["parent".to_string()], &fetcher).await.unwrap_err();
        assert!(matches!(err, GraphError::Baseline { status: 403, .. }));
    }
}
