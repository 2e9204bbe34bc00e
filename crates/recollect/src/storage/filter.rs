//! Filter types for cold-tier similarity searches
//!
//! A [`RecordFilter`] narrows a nearest-neighbour query. The same filter is rendered to a
//! SQL predicate for LanceDB and evaluated directly by the in-memory backend, so both
//! agree on what matches.

use crate::memory::types::ColdRecord;

/// Filter criteria for cold-tier searches.
///
/// All fields are optional - when `None`, that filter is not applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    /// Restrict to one conversation
    pub conversation_key: Option<String>,
}

impl RecordFilter {
    /// Create a new empty filter (no filtering applied)
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter to a single conversation
    pub fn for_conversation(conversation_key: impl Into<String>) -> Self {
        Self {
            conversation_key: Some(conversation_key.into()),
        }
    }

    /// Build a SQL WHERE clause from this filter.
    /// Returns `None` if no filters are set.
    pub fn to_sql_clause(&self) -> Option<String> {
        let mut conditions = Vec::new();

        if let Some(ref key) = self.conversation_key {
            conditions.push(format!("conversation_key = '{}'", escape_literal(key)));
        }

        if conditions.is_empty() {
            None
        } else {
            Some(conditions.join(" AND "))
        }
    }

    /// Evaluate the filter against a record in memory
    pub fn matches(&self, record: &ColdRecord) -> bool {
        match self.conversation_key {
            Some(ref key) => record.conversation_key == *key,
            None => true,
        }
    }

    /// Check if this filter is empty (no conditions set)
    pub fn is_empty(&self) -> bool {
        self.conversation_key.is_none()
    }
}

/// Escape a value for use inside a single-quoted SQL string literal
fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}
