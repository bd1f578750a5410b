use crate::graph::collection::Collection;

/// Chooses an id that no member of a collection has.
pub trait SentinelIdStrategy: Send + Sync {
    fn sentinel_id(&self, collection: &Collection) -> String;
}

/// One past the largest numeric member id, or a fixed high id when there is none.
#[derive(Debug, Clone, Copy)]
pub struct NumericSentinel {
    pub fallback: u64,
}

impl Default for NumericSentinel {
    fn default() -> Self {
        Self {
            fallback: 1_000_000_000,
        }
    }
}

impl SentinelIdStrategy for NumericSentinel {
    fn sentinel_id(&self, collection: &Collection) -> String {
        collection
            .member_ids()
            .iter()
            .filter_map(|id| id.parse::<u64>().ok())
            .max()
            .map(|max| max.saturating_add(1))
            .unwrap_or(self.fallback)
            .to_string()
    }
}
