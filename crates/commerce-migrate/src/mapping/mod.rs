//! Cross-system identifier mapping.
//!
//! Every adapter records `(entity type, source id) -> target id` after a
//! successful import. Writes are upserts, so replaying a row after a resume
//! converges on the same single entry instead of duplicating it.

mod key;
mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use key::{CompositeCategoryKey, CATEGORY_LANGUAGE_SEPARATOR};
pub use memory::MemoryMappingStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteMappingStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Kind of identity stored in the mapping table.
///
/// The numeric value is the persisted `type_id` and must never be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// Source product -> target variant (detail) record.
    Article = 1,
    /// Source category -> target category, used for item assignments.
    Category = 2,
    /// Source customer -> target user.
    Customer = 3,
    /// Source category -> target category, used for parent linking.
    CategoryTarget = 4,
}

impl EntityType {
    /// All entity types, in `type_id` order.
    pub const ALL: [Self; 4] = [
        Self::Article,
        Self::Category,
        Self::Customer,
        Self::CategoryTarget,
    ];

    /// Persisted numeric identifier.
    #[must_use]
    pub const fn type_id(self) -> i64 {
        self as i64
    }

    /// Resolves a persisted numeric identifier.
    #[must_use]
    pub fn from_type_id(id: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.type_id() == id)
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::Category => "category",
            Self::Customer => "customer",
            Self::CategoryTarget => "category_target",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::Config(format!("Unknown entity type '{}'", s)))
    }
}

/// One persisted identity link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// Entity type (key part).
    pub entity: EntityType,
    /// Identifier in the source system (key part).
    pub source_id: String,
    /// Identifier in the target system.
    pub target_id: String,
}

/// Persistent `(entity type, source id) -> target id` store.
///
/// No row locking is assumed: callers rely on upsert semantics, and no two
/// steps share an entity type's key space at the same time.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Inserts the link or overwrites the target of an existing one.
    async fn put(&self, entity: EntityType, source_id: &str, target_id: &str) -> Result<()>;

    /// Looks up a target by exact source id. Empty ids never match.
    async fn get(&self, entity: EntityType, source_id: &str) -> Result<Option<String>>;

    /// Returns the first target (in source id order) whose source id starts with `prefix`.
    async fn get_by_prefix(&self, entity: EntityType, prefix: &str) -> Result<Option<String>>;

    /// Returns every target whose source id equals `source_id` or starts with `prefix`.
    ///
    /// The exact match comes first, then the prefix matches in source id
    /// order. Each entry is returned once.
    async fn find_by_id_or_prefix(
        &self,
        entity: EntityType,
        source_id: &str,
        prefix: &str,
    ) -> Result<Vec<String>>;

    /// Points every entry targeting `old_target` at `new_target`.
    ///
    /// Returns the number of rewritten entries.
    async fn reassign_target(
        &self,
        entity: EntityType,
        old_target: &str,
        new_target: &str,
    ) -> Result<u64>;

    /// Deletes every entry of the given types. Returns the number removed.
    async fn reset(&self, entities: &[EntityType]) -> Result<u64>;

    /// Lists the entries of one type, ordered by source id.
    async fn entries(&self, entity: EntityType) -> Result<Vec<MappingEntry>>;
}

#[cfg(test)]
#[path = "mapping_tests.rs"]
mod tests;
