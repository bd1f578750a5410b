use miette::Diagnostic;
use thiserror::Error;

use crate::graph::errors::GraphError;
use crate::policy::errors::PolicyError;
use crate::validation::errors::EndpointError;

#[derive(Debug, Error, Diagnostic)]
pub enum AuditError {
    #[error("I/O error: {0}")]
    #[diagnostic(code(authz_audit::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(authz_audit::config))]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(authz_audit::serde))]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Endpoint(#[from] EndpointError),

    #[error("Exposed entities have no test data: {}", .0.join(", "))]
    #[diagnostic(
        code(authz_audit::missing_test_data),
        help("Add records of these types to the dataset or disable fail_on_missing_tests")
    )]
    MissingTestData(Vec<String>),

    #[error("Fixture snapshot `{path}` is invalid: {message}")]
    #[diagnostic(
        code(authz_audit::fixture),
        help("A snapshot is a JSON object mapping each entity type to a list of resources")
    )]
    Fixture { path: String, message: String },

    #[error("{0}")]
    #[diagnostic(code(authz_audit::execution))]
    Execution(String),
}
