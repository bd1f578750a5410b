//! Authorization checks derived from a user profile and the crawled graph.
//!
//! The generator walks the graph once per profile and emits pure
//! [`spec::ValidationSpec`] descriptions. A plan materializes them in order
//! into [`Validation`]s with deterministic ids, then runs them concurrently
//! against an [`endpoint::Endpoint`], keeping only the failures.

pub mod endpoint;
pub mod errors;
pub mod generator;
pub mod plan;
pub mod sentinel;
pub mod spec;

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::graph::resource::{Linkage, Resource, ResourceIdentifier};
use crate::policy::types::User;
use endpoint::{Endpoint, Method, OperationRequest, OperationResponse, Payload, Status, INTERNAL_ERROR};
use errors::EndpointError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Visible,
    NotVisible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutability {
    Mutable,
    Immutable,
}

/// What a relationship check does to the linkage under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipOp {
    Read,
    Create,
    Delete,
}

/// The assertion a validation makes beyond the status code.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckKind {
    CollectionContents {
        expected_ids: BTreeSet<String>,
    },
    EntityVisibility,
    EntryCreate {
        expected_view: Resource,
    },
    AttributeVisibility {
        attribute: String,
        visibility: Visibility,
    },
    AttributeMutability {
        attribute: String,
        mutability: Mutability,
    },
    Relationship {
        op: RelationshipOp,
        relationship: String,
        linkage: Linkage,
        resources: Visibility,
    },
    Deletability,
}

impl CheckKind {
    pub fn rule_name(&self) -> &'static str {
        match self {
            CheckKind::CollectionContents { .. } => "ReadCollection",
            CheckKind::EntityVisibility => "Read",
            CheckKind::EntryCreate { .. } => "Create",
            CheckKind::AttributeVisibility { .. } => "ReadAttributes",
            CheckKind::AttributeMutability { .. } => "SetAttributes",
            CheckKind::Relationship { op, .. } => match op {
                RelationshipOp::Read => "ReadRelation",
                RelationshipOp::Create => "CreateRelation",
                RelationshipOp::Delete => "DeleteRelation",
            },
            CheckKind::Deletability => "Delete",
        }
    }

    /// Inspect the returned resources of a response whose status matched.
    fn accepts(&self, response: &OperationResponse) -> bool {
        match self {
            CheckKind::CollectionContents { expected_ids } => {
                response.ids() == expected_ids.iter().map(String::as_str).collect()
            }
            CheckKind::AttributeVisibility {
                attribute,
                visibility,
            } => response
                .resources
                .first()
                .map(|r| r.attributes.contains_key(attribute) == (*visibility == Visibility::Visible))
                .unwrap_or(false),
            CheckKind::Relationship {
                op: RelationshipOp::Read,
                linkage,
                resources,
                ..
            } => {
                let received = response.identifiers();
                let under_test: BTreeSet<ResourceIdentifier> =
                    linkage.identifiers().into_iter().cloned().collect();
                match resources {
                    Visibility::Visible => received == under_test,
                    Visibility::NotVisible => received.is_disjoint(&under_test),
                }
            }
            CheckKind::EntryCreate { expected_view } => response
                .resources
                .first()
                .map(|r| r.same_view(expected_view))
                .unwrap_or(false),
            _ => true,
        }
    }
}

/// A concrete request plus the outcome it must produce.
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    id: String,
    user: User,
    kind: CheckKind,
    method: Method,
    path: String,
    expected: Status,
    payload: Option<Payload>,
}

impl Validation {
    pub(crate) fn new(
        id: String,
        user: User,
        kind: CheckKind,
        method: Method,
        path: String,
        expected: Status,
        payload: Option<Payload>,
    ) -> Self {
        Self {
            id,
            user,
            kind,
            method,
            path,
            expected,
            payload,
        }
    }

    /// Stable across runs for the same configuration and data.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn kind(&self) -> &CheckKind {
        &self.kind
    }

    pub fn rule_name(&self) -> &'static str {
        self.kind.rule_name()
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn expected(&self) -> Status {
        self.expected
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn request(&self) -> OperationRequest {
        OperationRequest {
            user: self.user.clone(),
            method: self.method,
            path: self.path.clone(),
            payload: self.payload.clone(),
        }
    }

    /// Issue the request and judge the response.
    pub async fn execute(
        self: &Arc<Self>,
        endpoint: &dyn Endpoint,
    ) -> Result<ValidationResult, EndpointError> {
        let response = endpoint.execute(self.request()).await?;
        let mut success = self.expected.matches(response.status);
        if success && self.expected.has_body() {
            success = self.kind.accepts(&response);
        }
        debug!(id = %self.id, status = response.status, success, "Validation executed");
        Ok(ValidationResult {
            validation: Arc::clone(self),
            received: response.status,
            success,
            message: response.message,
        })
    }
}

impl std::fmt::Display for Validation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}\tUser: {}\t{:>16}\t{:>7}\t{}\tExpected: {}\t",
            self.id,
            self.user.principal,
            format!("{}:", self.rule_name()),
            self.method,
            self.path,
            self.expected
        )
    }
}

/// Outcome of one executed validation.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    validation: Arc<Validation>,
    received: u16,
    success: bool,
    message: Option<String>,
}

impl ValidationResult {
    /// A check that could not complete.
    pub fn fault(validation: Arc<Validation>, message: impl Into<String>) -> Self {
        Self {
            validation,
            received: INTERNAL_ERROR,
            success: false,
            message: Some(message.into()),
        }
    }

    pub fn validation(&self) -> &Validation {
        &self.validation
    }

    pub fn id(&self) -> &str {
        self.validation.id()
    }

    pub fn received(&self) -> u16 {
        self.received
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl std::fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = if self.success { "Success" } else { "Failure" };
        write!(f, "{prefix}: {}Received: {}\t", self.validation, self.received)?;
        if !self.success {
            write!(f, "Body: {}\t", self.message.as_deref().unwrap_or_default())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct Fixed(OperationResponse);

    #[async_trait]
    impl Endpoint for Fixed {
        async fn execute(&self, _request: OperationRequest) -> Result<OperationResponse, EndpointError> {
            Ok(self.0.clone())
        }
    }

    fn mo() -> User {
        User {
            alias: "Mo".into(),
            principal: "mo".into(),
        }
    }

    fn validation(kind: CheckKind, expected: Status) -> Arc<Validation> {
        Arc::new(Validation::new(
            "ReadAttributes:parent#1Visible=firstName".into(),
            mo(),
            kind,
            Method::Get,
            "/parent/1".into(),
            expected,
            None,
        ))
    }

    fn parent_with(attribute: &str) -> Resource {
        let mut r = Resource::new("parent", "1");
        r.attributes.insert(attribute.into(), json!("x"));
        r
    }

    #[tokio::test]
    async fn test_attribute_visibility_checks_body() {
        let check = validation(
            CheckKind::AttributeVisibility {
                attribute: "firstName".into(),
                visibility: Visibility::Visible,
            },
            Status::Ok,
        );
        let present = Fixed(OperationResponse::with_resources(200, vec![parent_with("firstName")]));
        assert!(check.execute(&present).await.unwrap().success());

        let absent = Fixed(OperationResponse::with_resources(200, vec![parent_with("age")]));
        assert!(!check.execute(&absent).await.unwrap().success());
    }

    #[tokio::test]
    async fn test_denial_statuses_match_without_body_check() {
        let check = validation(CheckKind::EntityVisibility, Status::NotFound);
        let result = check
            .execute(&Fixed(OperationResponse::with_status(403)))
            .await
            .unwrap();
        assert!(result.success());
        assert_eq!(result.received(), 403);
    }

    #[tokio::test]
    async fn test_hidden_relationship_ids_must_be_absent() {
        let check = validation(
            CheckKind::Relationship {
                op: RelationshipOp::Read,
                relationship: "children".into(),
                linkage: Linkage::ToMany(vec![ResourceIdentifier::new("child", "3")]),
                resources: Visibility::NotVisible,
            },
            Status::Ok,
        );
        let visible = vec![Resource::new("child", "1"), Resource::new("child", "2")];
        let ok = Fixed(OperationResponse::with_resources(200, visible));
        assert!(check.execute(&ok).await.unwrap().success());

        let leaked = Fixed(OperationResponse::with_resources(200, vec![Resource::new("child", "3")]));
        assert!(!check.execute(&leaked).await.unwrap().success());
    }

    #[test]
    fn test_rendering() {
        let check = validation(CheckKind::EntityVisibility, Status::Ok);
        assert_eq!(
            check.to_string(),
            "ReadAttributes:parent#1Visible=firstName\tUser: mo\t           Read:\t    GET\t/parent/1\tExpected: 200\t"
        );

        let fault = ValidationResult::fault(check, "connection reset");
        assert_eq!(fault.received(), 599);
        let rendered = fault.to_string();
        assert!(rendered.starts_with("Failure: ReadAttributes:parent#1Visible=firstName\t"));
        assert!(rendered.ends_with("Received: 599\tBody: connection reset\t"));
    }
}
