//! NameLedger - chosen names bound to remote ids per parent scope
//!
//! ## Responsibilities
//!
//! - Unique `<prefix>__<n>` names within an (entity type, parent) scope
//! - Recording names after a confirmed remote creation
//! - Tombstoning entries of removed entities
//!
//! A tombstoned name stays reserved: `unique_name` never reissues it, while
//! `name_of` no longer resolves it. Uniqueness holds only against names already
//! committed when `unique_name` runs; callers serialize writers.

use crate::error::{Error, Result};
pub use crate::local_mirror::EntityType;
use crate::local_mirror::LedgerRepository;
use std::collections::HashSet;
use std::sync::Arc;

/// Separator between prefix and ordinal
pub const NAME_SEPARATOR: &str = "__";

/// Smallest `<prefix>__<n>` (n >= 1) not in `taken`
pub fn next_free_name<S: AsRef<str>>(prefix: &str, taken: &[S]) -> String {
    let taken: HashSet<&str> = taken.iter().map(|s| s.as_ref()).collect();
    (1u64..)
        .map(|n| format!("{}{}{}", prefix, NAME_SEPARATOR, n))
        .find(|candidate| !taken.contains(candidate.as_str()))
        .unwrap_or_else(|| prefix.to_string())
}

#[derive(Clone)]
pub struct NameLedger {
    repo: Arc<dyn LedgerRepository>,
}

impl NameLedger {
    pub fn new(repo: Arc<dyn LedgerRepository>) -> Self {
        Self { repo }
    }

    pub async fn unique_name(
        &self,
        entity_type: EntityType,
        prefix: &str,
        parent_id: i64,
    ) -> Result<String> {
        let taken = self.repo.names_in_scope(entity_type, parent_id).await?;
        Ok(next_free_name(prefix, taken.as_slice()))
    }

    pub async fn add(
        &self,
        entity_type: EntityType,
        entity_id: i64,
        parent_id: i64,
        name: &str,
    ) -> Result<()> {
        self.repo
            .insert_name(entity_type, entity_id, parent_id, name)
            .await?;
        tracing::debug!(
            entity_type = %entity_type,
            entity_id,
            parent_id,
            name = %name,
            "Name recorded"
        );
        Ok(())
    }

    /// Marks the entity's entry inactive; the row is kept
    pub async fn tombstone(&self, entity_type: EntityType, entity_id: i64) -> Result<()> {
        let entry = self
            .repo
            .find_active(entity_type, entity_id)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("no active {} name for id {}", entity_type, entity_id))
            })?;
        self.repo.deactivate(entry.id).await?;
        tracing::debug!(entity_type = %entity_type, entity_id, name = %entry.entity_name, "Name tombstoned");
        Ok(())
    }

    pub async fn name_of(&self, entity_type: EntityType, entity_id: i64) -> Result<String> {
        self.repo
            .find_active(entity_type, entity_id)
            .await?
            .map(|entry| entry.entity_name)
            .ok_or_else(|| {
                Error::NotFound(format!("no active {} name for id {}", entity_type, entity_id))
            })
    }
}
