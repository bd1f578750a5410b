//! Per-user access policy: configuration rows, the expression languages they
//! use, and the profiles resolved from them against the crawled graph.

pub mod dictionary;
pub mod errors;
pub mod fields;
pub mod id_list;
pub mod loader;
pub mod profile;
pub mod scoped;
pub mod types;
