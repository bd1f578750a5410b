/// One step on the path from the graph root to a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Collection { field_name: String, is_root: bool },
    Entity { entity_type: String, id: String },
}

impl Segment {
    /// The text this segment contributes to a path.
    pub fn path_part(&self) -> &str {
        match self {
            Segment::Collection { field_name, .. } => field_name,
            Segment::Entity { id, .. } => id,
        }
    }
}

/// Ancestors of a node, from the graph root (exclusive) to the immediate parent.
/// Copied by value into every node; never mutated after construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Lineage {
    segments: Vec<Segment>,
}

impl Lineage {
    pub fn root() -> Self {
        Self::default()
    }

    /// Lineage of a child whose parent is `self` extended by `parent`.
    pub fn extended(&self, parent: Segment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(parent);
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn parent(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// The entity segment that owns the immediate parent collection, if any.
    pub fn owning_entity(&self) -> Option<(&str, &str)> {
        let len = self.segments.len();
        if len < 2 {
            return None;
        }
        match &self.segments[len - 2] {
            Segment::Entity { entity_type, id } => Some((entity_type.as_str(), id.as_str())),
            Segment::Collection { .. } => None,
        }
    }

    pub fn contains_entity(&self, entity_type: &str, id: &str) -> bool {
        self.segments.iter().any(|s| {
            matches!(s, Segment::Entity { entity_type: t, id: i } if t == entity_type && i == id)
        })
    }

    /// `/a/1/b` for the ancestors; empty for the root.
    pub fn path(&self) -> String {
        self.segments
            .iter()
            .map(|s| format!("/{}", s.path_part()))
            .collect()
    }
}
