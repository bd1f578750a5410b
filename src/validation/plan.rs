use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::policy::profile::UserProfile;
use crate::validation::endpoint::Endpoint;
use crate::validation::spec::ValidationSpec;
use crate::validation::{Validation, ValidationResult};

/// Which materialized validations run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    disabled: BTreeSet<String>,
    /// Empty runs everything not disabled.
    execute_ids: BTreeSet<String>,
}

impl Selection {
    pub fn new(disabled: BTreeSet<String>, execute_ids: BTreeSet<String>) -> Self {
        Self {
            disabled,
            execute_ids,
        }
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn selects(&self, id: &str) -> bool {
        !self.disabled.contains(id) && (self.execute_ids.is_empty() || self.execute_ids.contains(id))
    }
}

/// How many validations may be in flight at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    Unbounded,
    Bounded(usize),
}

impl Concurrency {
    /// `0` means unbounded.
    pub fn from_limit(limit: usize) -> Self {
        if limit == 0 {
            Concurrency::Unbounded
        } else {
            Concurrency::Bounded(limit)
        }
    }
}

/// Ordered checks for one profile, not yet resolved into requests.
#[derive(Debug, Clone)]
pub struct ValidationPlan<'g> {
    specs: Vec<ValidationSpec<'g>>,
}

impl<'g> ValidationPlan<'g> {
    pub fn new(specs: Vec<ValidationSpec<'g>>) -> Self {
        Self { specs }
    }

    pub fn specs(&self) -> &[ValidationSpec<'g>] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Resolve every spec in plan order.
    pub fn materialize(&self, profile: &UserProfile) -> MaterializedPlan {
        let validations = self
            .specs
            .iter()
            .filter_map(|spec| spec.materialize(profile))
            .map(Arc::new)
            .collect();
        MaterializedPlan { validations }
    }
}

/// Concrete validations that own their data and can leave the graph behind.
#[derive(Debug, Clone, Default)]
pub struct MaterializedPlan {
    validations: Vec<Arc<Validation>>,
}

#[derive(Default)]
struct FailureSink {
    completed: HashSet<usize>,
    failures: Vec<(usize, ValidationResult)>,
}

impl MaterializedPlan {
    pub fn validations(&self) -> impl Iterator<Item = &Validation> {
        self.validations.iter().map(Arc::as_ref)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.validations().map(Validation::id).collect()
    }

    pub fn len(&self) -> usize {
        self.validations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validations.is_empty()
    }

    /// Run the selected validations concurrently and return the failures in
    /// plan order. Endpoint errors and aborted tasks become 599 failures.
    pub async fn execute(
        &self,
        endpoint: Arc<dyn Endpoint>,
        selection: &Selection,
        concurrency: Concurrency,
    ) -> Vec<ValidationResult> {
        let semaphore = match concurrency {
            Concurrency::Bounded(limit) => Some(Arc::new(Semaphore::new(limit.max(1)))),
            Concurrency::Unbounded => None,
        };
        let sink = Arc::new(Mutex::new(FailureSink::default()));
        let mut tasks = JoinSet::new();
        let mut selected = Vec::new();

        for (index, validation) in self.validations.iter().enumerate() {
            if !selection.selects(validation.id()) {
                debug!(id = %validation.id(), "Validation not selected");
                continue;
            }
            selected.push(index);

            let validation = Arc::clone(validation);
            let endpoint = Arc::clone(&endpoint);
            let semaphore = semaphore.clone();
            let sink = Arc::clone(&sink);
            tasks.spawn(async move {
                let _permit = match semaphore {
                    Some(semaphore) => match semaphore.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => {
                            let mut sink = sink.lock().await;
                            sink.completed.insert(index);
                            sink.failures
                                .push((index, ValidationResult::fault(validation, "semaphore closed")));
                            return;
                        }
                    },
                    None => None,
                };

                let result = match validation.execute(endpoint.as_ref()).await {
                    Ok(result) => result,
                    Err(err) => {
                        warn!(id = %validation.id(), error = %err, "Validation faulted");
                        ValidationResult::fault(Arc::clone(&validation), err.to_string())
                    }
                };

                let mut sink = sink.lock().await;
                sink.completed.insert(index);
                if !result.success() {
                    sink.failures.push((index, result));
                }
            });
        }

        let spawned = selected.len();
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "Validation task aborted");
            }
        }

        let mut sink = sink.lock().await;
        for index in selected {
            if !sink.completed.contains(&index) {
                let validation = Arc::clone(&self.validations[index]);
                sink.failures
                    .push((index, ValidationResult::fault(validation, "validation task aborted")));
            }
        }
        let mut failures = std::mem::take(&mut sink.failures);
        failures.sort_by_key(|(index, _)| *index);

        info!(
            executed = spawned,
            failed = failures.len(),
            "Validation plan executed"
        );
        failures.into_iter().map(|(_, result)| result).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::policy::types::User;
    use crate::validation::endpoint::{Method, OperationRequest, OperationResponse, Status};
    use crate::validation::errors::EndpointError;
    use crate::validation::CheckKind;

    /// Answers 204 except for scripted paths.
    struct Scripted;

    #[async_trait]
    impl Endpoint for Scripted {
        async fn execute(&self, request: OperationRequest) -> Result<OperationResponse, EndpointError> {
            match request.path.as_str() {
                "/fails" => Ok(OperationResponse::with_status(500)),
                "/errors" => Err(EndpointError::Transport {
                    method: request.method.to_string(),
                    path: request.path,
                    message: "connection reset".into(),
                }),
                "/panics" => panic!("endpoint bug"),
                _ => Ok(OperationResponse::with_status(204)),
            }
        }
    }

    fn plan(paths: &[&str]) -> MaterializedPlan {
        let user = User {
            alias: "Mo".into(),
            principal: "mo".into(),
        };
        let validations = paths
            .iter()
            .enumerate()
            .map(|(i, path)| {
                Arc::new(Validation::new(
                    format!("Delete:check#{i}@{path}"),
                    user.clone(),
                    CheckKind::Deletability,
                    Method::Delete,
                    path.to_string(),
                    Status::NoContent,
                    None,
                ))
            })
            .collect();
        MaterializedPlan { validations }
    }

    #[tokio::test]
    async fn test_faults_become_internal_errors() {
        let plan = plan(&["/ok", "/panics", "/fails", "/ok", "/errors"]);
        let failures = plan
            .execute(Arc::new(Scripted), &Selection::all(), Concurrency::Bounded(2))
            .await;

        let summary: Vec<(&str, u16)> = failures.iter().map(|r| (r.validation().path(), r.received())).collect();
        assert_eq!(summary, vec![("/panics", 599), ("/fails", 500), ("/errors", 599)]);
        assert_eq!(failures[2].message(), Some("Request DELETE /errors failed: connection reset"));
    }

    #[tokio::test]
    async fn test_selection_honors_disabled_and_allow_list() {
        let plan = plan(&["/fails", "/fails", "/fails"]);
        let disabled = BTreeSet::from(["Delete:check#0@/fails".to_string()]);

        let failures = plan
            .execute(Arc::new(Scripted), &Selection::new(disabled.clone(), BTreeSet::new()), Concurrency::Unbounded)
            .await;
        assert_eq!(failures.len(), 2);

        let allow = BTreeSet::from(["Delete:check#0@/fails".to_string(), "Delete:check#2@/fails".to_string()]);
        let failures = plan
            .execute(Arc::new(Scripted), &Selection::new(disabled, allow), Concurrency::from_limit(0))
            .await;
        let ids: Vec<&str> = failures.iter().map(ValidationResult::id).collect();
        assert_eq!(ids, vec!["Delete:check#2@/fails"]);
    }

    #[test]
    fn test_concurrency_from_limit() {
        assert_eq!(Concurrency::from_limit(0), Concurrency::Unbounded);
        assert_eq!(Concurrency::from_limit(8), Concurrency::Bounded(8));
    }
}
