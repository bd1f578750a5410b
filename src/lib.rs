//! authz-audit - authorization validation planner
//!
//! Crawls a dataset, derives per-user permission views from a declarative
//! policy, and generates and executes deterministic validation plans.
//! It exposes all modules for testing purposes.

pub mod driver;
pub mod errors;
pub mod fixtures;
pub mod graph;
pub mod policy;
pub mod settings;
pub mod validation;
