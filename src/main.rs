use std::sync::Arc;

use authz_audit::driver::{DriverOptions, ValidationDriver};
use authz_audit::fixtures::FixtureStore;
use authz_audit::graph::crawl::crawl;
use authz_audit::graph::directory::EntityDirectory;
use authz_audit::policy::loader::load_audit_config;
use authz_audit::policy::types::AliasUserFactory;
use authz_audit::settings::Settings;
use authz_audit::validation::endpoint::Endpoint;
use clap::{Parser, Subcommand};
use miette::{miette, Result};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "authz-audit",
    version,
    about = "Derive deterministic authorization validation plans from per-user access policies"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "authz-audit.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the validation ids each user's plan contains
    Plan {
        /// Only print the plan of this user alias
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Print the crawled dataset, per entity type
    Graph,
    /// Run every plan against the snapshot served without authorization and
    /// print the failures per user
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    let audit = load_audit_config(&settings.audit.config_path)?;
    let store = Arc::new(FixtureStore::load(&settings.fixtures.snapshot_path)?);

    match cli.command {
        Command::Plan { user } => {
            let options = DriverOptions::from_settings(&settings.execution);
            let driver = ValidationDriver::build(audit, &*store, &AliasUserFactory, options).await?;
            let selection = driver.selection();
            for profile in driver.profiles() {
                if user.as_deref().is_some_and(|alias| alias != profile.user().alias) {
                    continue;
                }
                let ids = driver.plan_ids(profile);
                let selected = ids.iter().filter(|id| selection.selects(id)).count();
                println!("# {profile}: {} validations, {selected} selected", ids.len());
                for id in ids {
                    println!("{id}");
                }
            }
        }
        Command::Graph => {
            let graph = crawl(&audit.rootable_types(), &*store).await?;
            let directory = EntityDirectory::from_graph(&graph);
            for root in graph.roots() {
                println!("/{} ({} records)", root.field_name(), root.len());
            }
            for entity_type in directory.types() {
                println!("{entity_type}: {}", directory.ids_of_type(entity_type).join(", "));
            }
        }
        Command::Run => {
            let options = DriverOptions::from_settings(&settings.execution);
            let driver = ValidationDriver::build(audit, &*store, &AliasUserFactory, options).await?;
            let endpoint: Arc<dyn Endpoint> = store.clone();
            let results = driver.execute(endpoint).await?;

            let mut failed = 0;
            for (profile, failures) in &results {
                println!("# {profile}: {} failures", failures.len());
                for failure in failures {
                    println!("{failure}");
                }
                failed += failures.len();
            }
            if failed > 0 {
                return Err(miette!("{failed} validations failed"));
            }
        }
    }
    Ok(())
}
