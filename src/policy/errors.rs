use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PolicyError {
    #[error("Failed to load audit configuration `{path}`")]
    #[diagnostic(
        code(authz_audit::policy::load),
        help("Check that the file exists and contains valid KDL syntax")
    )]
    LoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid audit configuration: {0}")]
    #[diagnostic(
        code(authz_audit::policy::invalid_config),
        help("Top-level nodes are `expose`, `schema`, `users`, `alias`, `permission` and `disabled`")
    )]
    InvalidConfig(String),

    #[error("Invalid id list `{expression}`: {message}")]
    #[diagnostic(
        code(authz_audit::policy::invalid_id_list),
        help("Syntax: `1,2`, `[All]` on its own, or `[type.relationship]`")
    )]
    InvalidIdList { expression: String, message: String },

    #[error("Invalid field restriction `{expression}`: {message}")]
    #[diagnostic(
        code(authz_audit::policy::invalid_fields),
        help("Syntax: `[ALL]`, `a,b`, or `[EXCLUDING] a,b`; field names start with a letter or `_`")
    )]
    InvalidFieldExpression { expression: String, message: String },

    #[error("Unknown entity type `{0}`")]
    #[diagnostic(
        code(authz_audit::policy::unknown_type),
        help("Declare the type with `schema \"<type>\" {{ ... }}` or make sure the crawl reaches it")
    )]
    UnknownType(String),

    #[error("Entity type `{entity_type}` has no field `{field}`")]
    #[diagnostic(code(authz_audit::policy::unknown_field))]
    UnknownField { entity_type: String, field: String },

    #[error("Entity type `{entity_type}` has no relationship `{relationship}`")]
    #[diagnostic(code(authz_audit::policy::unknown_relationship))]
    UnknownRelationship {
        entity_type: String,
        relationship: String,
    },

    #[error("Relationship `{entity_type}.{relationship}` targets `{actual}`, expected `{expected}`")]
    #[diagnostic(
        code(authz_audit::policy::type_mismatch),
        help("A subcollection reference must point at the type the row configures")
    )]
    RelationshipTypeMismatch {
        entity_type: String,
        relationship: String,
        expected: String,
        actual: String,
    },

    #[error("Restricted fields declared twice for `{entity_type}#{id}`")]
    #[diagnostic(
        code(authz_audit::policy::duplicate_restriction),
        help("Only one row per user may restrict fields of a given record")
    )]
    DuplicateRestrictedFields { entity_type: String, id: String },

    #[error("Cyclic id-list dependency detected: {0}")]
    #[diagnostic(
        code(authz_audit::policy::cyclic_dependency),
        help("Check the `[type.relationship]` references in your permission rows for circular references")
    )]
    CyclicDependency(String),

    #[error("Cyclic alias detected: {0}")]
    #[diagnostic(
        code(authz_audit::policy::cyclic_alias),
        help("Check your `alias` definitions for circular references")
    )]
    CyclicAlias(String),

    #[error("Cannot merge configuration for `{left}` with configuration for `{right}`")]
    #[diagnostic(code(authz_audit::policy::mismatched_merge))]
    MismatchedMerge { left: String, right: String },

    #[error("KDL parse error: {0}")]
    #[diagnostic(
        code(authz_audit::policy::kdl_parse),
        help("Check your KDL file syntax, see https://kdl.dev for the specification")
    )]
    KdlParse(String),

    #[error("I/O error: {0}")]
    #[diagnostic(code(authz_audit::policy::io))]
    Io(#[from] std::io::Error),
}
