pub mod builders;
pub mod endpoint;

pub use builders::{family, KdlConfig, ResourceBuilder, SnapshotBuilder, FAMILY_KDL};
pub use endpoint::{FaultyEndpoint, OpenEndpoint};
