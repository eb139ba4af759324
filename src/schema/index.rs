//! Index descriptors

use serde::{Deserialize, Serialize};

/// Kind of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Ordered value index over the key fields
    Value,
    /// Value index that also maintains a ranked set for rank/select
    Rank,
    /// Maintained by an external index maintainer; never planned
    Other,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Value => "value",
            IndexKind::Rank => "rank",
            IndexKind::Other => "other",
        }
    }
}

/// Immutable description of a registered index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub record_type: String,
    /// Ordered key fields
    pub key_fields: Vec<String>,
    pub unique: bool,
    pub kind: IndexKind,
    /// Extra fields stored alongside the key
    #[serde(default)]
    pub covering_fields: Vec<String>,
}

impl IndexDescriptor {
    /// Create a non-unique value index
    pub fn value(
        name: impl Into<String>,
        record_type: impl Into<String>,
        key_fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            record_type: record_type.into(),
            key_fields: key_fields.into_iter().map(Into::into).collect(),
            unique: false,
            kind: IndexKind::Value,
            covering_fields: Vec::new(),
        }
    }

    /// Create a rank index over a single field
    pub fn rank(
        name: impl Into<String>,
        record_type: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            kind: IndexKind::Rank,
            ..Self::value(name, record_type, [field.into()])
        }
    }

    /// Create an index maintained outside the planner's reach
    pub fn other(
        name: impl Into<String>,
        record_type: impl Into<String>,
        key_fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            kind: IndexKind::Other,
            ..Self::value(name, record_type, key_fields)
        }
    }

    /// Mark the index unique
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Store extra fields in the index entries
    pub fn with_covering(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.covering_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// First key field
    pub fn leading_field(&self) -> Option<&str> {
        self.key_fields.first().map(String::as_str)
    }

    /// Whether the planner may scan this index
    pub fn is_plannable(&self) -> bool {
        self.kind != IndexKind::Other && !self.key_fields.is_empty()
    }

    pub fn is_rank(&self) -> bool {
        self.kind == IndexKind::Rank
    }

    /// Whether an index entry carries the field's value
    pub fn stores_field(&self, field: &str) -> bool {
        self.key_fields.iter().any(|f| f == field) || self.covering_fields.iter().any(|f| f == field)
    }
}
