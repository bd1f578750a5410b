use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("Cannot build baseline graph: fetching `{path}` returned status {status}")]
    #[diagnostic(
        code(authz_audit::graph::baseline),
        help("The crawl runs with full visibility; every exposed collection must be readable")
    )]
    Baseline { path: String, status: u16 },

    #[error("Collection `{0}` was already populated")]
    #[diagnostic(code(authz_audit::graph::already_populated))]
    AlreadyPopulated(String),

    #[error("Entity `{entity}` has no relationship named `{relationship}`")]
    #[diagnostic(code(authz_audit::graph::unknown_relationship))]
    UnknownRelationship {
        entity: String,
        relationship: String,
    },

    #[error("Resource fetch failed for `{path}`: {message}")]
    #[diagnostic(
        code(authz_audit::graph::fetch),
        help("Check that the fixture snapshot or backing store is reachable")
    )]
    Fetch { path: String, message: String },
}
