use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::errors::AuditError;
use crate::graph::crawl::crawl;
use crate::graph::directory::EntityDirectory;
use crate::graph::resource::ResourceFetcher;
use crate::graph::EntityGraph;
use crate::policy::dictionary::TypeDictionary;
use crate::policy::profile::{build_profiles, UserProfile};
use crate::policy::types::{AuditConfig, UserFactory};
use crate::settings::Execution;
use crate::validation::endpoint::Endpoint;
use crate::validation::generator::PlanGenerator;
use crate::validation::plan::{Concurrency, Selection, ValidationPlan};
use crate::validation::sentinel::{NumericSentinel, SentinelIdStrategy};
use crate::validation::ValidationResult;

#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub concurrency: Concurrency,
    /// Allow-list of validation ids; empty runs everything not disabled.
    pub execute_ids: BTreeSet<String>,
    pub fail_on_missing_tests: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            concurrency: Concurrency::Unbounded,
            execute_ids: BTreeSet::new(),
            fail_on_missing_tests: false,
        }
    }
}

impl DriverOptions {
    pub fn from_settings(execution: &Execution) -> Self {
        Self {
            concurrency: Concurrency::from_limit(execution.max_concurrency),
            execute_ids: execution.execute_ids.iter().cloned().collect(),
            fail_on_missing_tests: execution.fail_on_missing_tests,
        }
    }
}

/// Crawls the dataset once, builds every user profile, and derives and runs
/// each profile's validation plan.
pub struct ValidationDriver {
    config: AuditConfig,
    graph: EntityGraph,
    dictionary: TypeDictionary,
    profiles: Vec<UserProfile>,
    options: DriverOptions,
    sentinels: Box<dyn SentinelIdStrategy>,
}

impl ValidationDriver {
    pub async fn build(
        config: AuditConfig,
        fetcher: &dyn ResourceFetcher,
        users: &dyn UserFactory,
        options: DriverOptions,
    ) -> Result<Self, AuditError> {
        info!("Exploring test data");
        let graph = crawl(&config.rootable_types(), fetcher).await?;

        let (dictionary, profiles) = {
            let directory = EntityDirectory::from_graph(&graph);
            warn_for_missing_tests(&config, &directory, options.fail_on_missing_tests)?;

            let mut dictionary = TypeDictionary::from_directory(&directory);
            for schema in &config.schemas {
                dictionary.declare(schema);
            }
            let profiles = build_profiles(&config, &directory, &dictionary, users)?;
            (dictionary, profiles)
        };

        Ok(Self {
            config,
            graph,
            dictionary,
            profiles,
            options,
            sentinels: Box::new(NumericSentinel::default()),
        })
    }

    pub fn with_sentinel_strategy(mut self, sentinels: Box<dyn SentinelIdStrategy>) -> Self {
        self.sentinels = sentinels;
        self
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub fn graph(&self) -> &EntityGraph {
        &self.graph
    }

    pub fn dictionary(&self) -> &TypeDictionary {
        &self.dictionary
    }

    /// Profiles in configuration order.
    pub fn profiles(&self) -> &[UserProfile] {
        &self.profiles
    }

    pub fn profile(&self, alias: &str) -> Option<&UserProfile> {
        self.profiles.iter().find(|p| p.user().alias == alias)
    }

    pub fn selection(&self) -> Selection {
        Selection::new(self.config.disabled.clone(), self.options.execute_ids.clone())
    }

    pub fn plan_for(&self, profile: &UserProfile) -> ValidationPlan<'_> {
        ValidationPlan::new(PlanGenerator::generate(
            &self.graph,
            profile,
            &self.dictionary,
            self.sentinels.as_ref(),
        ))
    }

    /// Deterministic ids of every validation `profile` would run, in plan order.
    pub fn plan_ids(&self, profile: &UserProfile) -> Vec<String> {
        self.plan_for(profile)
            .materialize(profile)
            .ids()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Materialize every plan in order, then run all of them concurrently.
    pub async fn execute(
        &self,
        endpoint: Arc<dyn Endpoint>,
    ) -> Result<BTreeMap<UserProfile, Vec<ValidationResult>>, AuditError> {
        let selection = self.selection();
        let concurrency = self.options.concurrency;
        let mut tasks = JoinSet::new();

        for profile in &self.profiles {
            info!(user = %profile, "Generating validation plan");
            let plan = self.plan_for(profile).materialize(profile);
            info!(user = %profile, validations = plan.len(), "Executing validations");

            let profile = profile.clone();
            let endpoint = Arc::clone(&endpoint);
            let selection = selection.clone();
            tasks.spawn(async move {
                let failures = plan.execute(endpoint, &selection, concurrency).await;
                (profile, failures)
            });
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            let (profile, failures) =
                joined.map_err(|e| AuditError::Execution(format!("validation run aborted: {e}")))?;
            info!(user = %profile, failures = failures.len(), "Finished validations");
            results.insert(profile, failures);
        }
        Ok(results)
    }
}

fn warn_for_missing_tests(
    config: &AuditConfig,
    directory: &EntityDirectory<'_>,
    fail_on_missing_tests: bool,
) -> Result<(), AuditError> {
    let mut missing = Vec::new();
    for exposed in &config.exposed {
        if !directory.contains_type(&exposed.entity_type) {
            warn!(entity = %exposed.entity_type, "No tests will run for entity");
            missing.push(exposed.entity_type.clone());
        }
    }
    if fail_on_missing_tests && !missing.is_empty() {
        return Err(AuditError::MissingTestData(missing));
    }
    Ok(())
}
