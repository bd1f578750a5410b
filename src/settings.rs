use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub audit: Audit,
    pub fixtures: Fixtures,
    pub execution: Execution,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Audit {
    /// KDL audit configuration: a file, or a directory of `.kdl` files.
    pub config_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixtures {
    /// JSON snapshot crawled in place of a live backend.
    pub snapshot_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    /// Validations in flight per user; 0 means unbounded.
    pub max_concurrency: usize,
    /// Run only these validation ids. Space separated when set from the environment.
    #[serde(default)]
    pub execute_ids: Vec<String>,
    /// Fail when an exposed entity has no records in the dataset.
    #[serde(default)]
    pub fail_on_missing_tests: bool,
}

impl Default for Audit {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("audit"),
        }
    }
}

impl Default for Fixtures {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("data/snapshot.json"),
        }
    }
}

impl Default for Execution {
    fn default() -> Self {
        Self {
            max_concurrency: 32,
            execute_ids: Vec::new(),
            fail_on_missing_tests: false,
        }
    }
}

const ENV_PREFIX: &str = "AUTHZ_AUDIT";

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    fn load_with_prefix(path: &str, env_prefix: &str) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default(
                "audit.config_path",
                Audit::default().config_path.to_string_lossy().to_string(),
            )
            .into_diagnostic()?
            .set_default(
                "fixtures.snapshot_path",
                Fixtures::default()
                    .snapshot_path
                    .to_string_lossy()
                    .to_string(),
            )
            .into_diagnostic()?
            .set_default(
                "execution.max_concurrency",
                Execution::default().max_concurrency as u64,
            )
            .into_diagnostic()?
            .set_default("execution.execute_ids", Vec::<String>::new())
            .into_diagnostic()?
            .set_default("execution.fail_on_missing_tests", false)
            .into_diagnostic()?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: AUTHZ_AUDIT__EXECUTION__MAX_CONCURRENCY=4, etc.
        builder = builder.add_source(
            config::Environment::with_prefix(env_prefix)
                .separator("__")
                .try_parsing(true)
                .list_separator(" ")
                .with_list_parse_key("execution.execute_ids"),
        );

        let cfg = builder.build().into_diagnostic()?;
        let mut s: Settings = cfg.try_deserialize().into_diagnostic()?;

        // Normalize paths to be relative to current dir
        if s.audit.config_path.is_relative() {
            s.audit.config_path = std::env::current_dir()
                .into_diagnostic()?
                .join(&s.audit.config_path);
        }
        if s.fixtures.snapshot_path.is_relative() {
            s.fixtures.snapshot_path = std::env::current_dir()
                .into_diagnostic()?
                .join(&s.fixtures.snapshot_path);
        }

        Ok(s)
    }
}
