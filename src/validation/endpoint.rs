use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::graph::resource::{Linkage, Resource, ResourceIdentifier};
use crate::policy::types::User;
use crate::validation::errors::EndpointError;

/// Operation verbs understood by the system under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        };
        f.pad(s)
    }
}

/// Statuses a check can expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Status {
    Ok,
    Created,
    NoContent,
    Forbidden,
    NotFound,
    InternalError,
}

/// Reported for checks that faulted instead of completing.
pub const INTERNAL_ERROR: u16 = 599;

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::Created => 201,
            Status::NoContent => 204,
            Status::Forbidden => 403,
            Status::NotFound => 404,
            Status::InternalError => INTERNAL_ERROR,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Status::Ok | Status::Created | Status::NoContent)
    }

    /// Responses with this status carry resources worth inspecting.
    pub fn has_body(self) -> bool {
        matches!(self, Status::Ok | Status::Created)
    }

    /// 403 and 404 are interchangeable denials.
    pub fn matches(self, received: u16) -> bool {
        let expected = self.code();
        expected == received || matches!((expected, received), (403, 404) | (404, 403))
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Resource(Resource),
    Linkage(Linkage),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationRequest {
    pub user: User,
    pub method: Method,
    pub path: String,
    pub payload: Option<Payload>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OperationResponse {
    pub status: u16,
    /// Returned resources; relationship reads return bare identifiers.
    pub resources: Vec<Resource>,
    pub message: Option<String>,
}

impl OperationResponse {
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_resources(status: u16, resources: Vec<Resource>) -> Self {
        Self {
            status,
            resources,
            message: None,
        }
    }

    pub fn identifiers(&self) -> BTreeSet<ResourceIdentifier> {
        self.resources.iter().map(Resource::identifier).collect()
    }

    pub fn ids(&self) -> BTreeSet<&str> {
        self.resources.iter().map(|r| r.id.as_str()).collect()
    }
}

/// The system under test, exercised on behalf of a user.
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn execute(&self, request: OperationRequest) -> Result<OperationResponse, EndpointError>;
}
