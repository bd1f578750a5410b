use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use authz_audit::fixtures::FixtureStore;
use authz_audit::validation::endpoint::{Endpoint, OperationRequest, OperationResponse};
use authz_audit::validation::errors::EndpointError;

/// Serves a fixture store to every user with no authorization at all and
/// records each request.
pub struct OpenEndpoint {
    store: FixtureStore,
    requests: Mutex<Vec<OperationRequest>>,
}

impl OpenEndpoint {
    pub fn new(store: FixtureStore) -> Arc<Self> {
        Arc::new(Self {
            store,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<OperationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Endpoint for OpenEndpoint {
    async fn execute(&self, request: OperationRequest) -> Result<OperationResponse, EndpointError> {
        self.requests.lock().unwrap().push(request.clone());
        self.store.execute(request).await
    }
}

/// Delegates to another endpoint except on broken paths, where it fails the
/// request or panics.
pub struct FaultyEndpoint {
    inner: Arc<dyn Endpoint>,
    failing: BTreeSet<String>,
    panicking: BTreeSet<String>,
}

impl FaultyEndpoint {
    pub fn new(inner: Arc<dyn Endpoint>) -> Self {
        Self {
            inner,
            failing: BTreeSet::new(),
            panicking: BTreeSet::new(),
        }
    }

    pub fn failing_on(mut self, path: &str) -> Self {
        self.failing.insert(path.to_string());
        self
    }

    pub fn panicking_on(mut self, path: &str) -> Self {
        self.panicking.insert(path.to_string());
        self
    }

    pub fn broken_paths(&self) -> BTreeSet<String> {
        self.failing.union(&self.panicking).cloned().collect()
    }
}

#[async_trait]
impl Endpoint for FaultyEndpoint {
    async fn execute(&self, request: OperationRequest) -> Result<OperationResponse, EndpointError> {
        if self.panicking.contains(&request.path) {
            panic!("endpoint crashed on {}", request.path);
        }
        if self.failing.contains(&request.path) {
            return Err(EndpointError::Transport {
                method: request.method.to_string(),
                path: request.path,
                message: "connection reset".into(),
            });
        }
        self.inner.execute(request).await
    }
}
