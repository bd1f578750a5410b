use miette::Diagnostic;
use thiserror::Error;

/// Faults raised by the system under test rather than by a check.
#[derive(Debug, Error, Diagnostic)]
pub enum EndpointError {
    #[error("Request {method} {path} failed: {message}")]
    #[diagnostic(
        code(authz_audit::endpoint::transport),
        help("The endpoint could not complete the request; the check is reported with status 599")
    )]
    Transport {
        method: String,
        path: String,
        message: String,
    },

    #[error("Malformed response for `{path}`: {message}")]
    #[diagnostic(
        code(authz_audit::endpoint::protocol),
        help("Responses must carry a status code and zero or more resources")
    )]
    Protocol { path: String, message: String },
}
