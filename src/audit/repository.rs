//! Storage seam for the audit trail
use super::chain::ChainLink;
use super::entry::{AuditLog, EntityType};
use crate::error::AuditError;
use std::sync::{RwLock, RwLockReadGuard};

/// Backing store for an [`AuditTrail`](super::AuditTrail).
///
/// The chain head (last hash) is part of the repository, not the trail:
/// reading it, linking the new entry, storing the entry and advancing the head
/// must be one atomic step inside `append_chained`.
pub trait AuditRepository: Send + Sync {
    /// Call `link` with the current last hash, store the entry it returns and
    /// make its hash the new head. Backends that retry on conflict may call
    /// `link` more than once.
    fn append_chained(
        &self,
        link: &dyn Fn(&str) -> Result<ChainLink, AuditError>,
    ) -> Result<AuditLog, AuditError>;

    /// Every entry in insertion order.
    fn entries(&self) -> Result<Vec<AuditLog>, AuditError>;

    /// Current chain head; empty for an empty chain.
    fn last_hash(&self) -> Result<String, AuditError>;

    /// Entries and chain head read together, so the head always belongs to
    /// the last returned entry even while appends are running.
    fn snapshot(&self) -> Result<(Vec<AuditLog>, String), AuditError>;

    fn query_by_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        limit: usize,
    ) -> Result<Vec<AuditLog>, AuditError> {
        let entries = self.entries()?;
        Ok(newest_first(entries.iter(), limit, |e| {
            e.entity_type == entity_type && e.entity_id == entity_id
        }))
    }

    fn query_by_user(&self, user_id: &str, limit: usize) -> Result<Vec<AuditLog>, AuditError> {
        let entries = self.entries()?;
        Ok(newest_first(entries.iter(), limit, |e| e.user_id == user_id))
    }
}

// a limit of zero means unbounded
pub(crate) fn newest_first<'a>(
    entries: impl DoubleEndedIterator<Item = &'a AuditLog>,
    limit: usize,
    predicate: impl Fn(&AuditLog) -> bool,
) -> Vec<AuditLog> {
    let limit = if limit == 0 { usize::MAX } else { limit };
    entries
        .rev()
        .filter(|e| predicate(*e))
        .take(limit)
        .cloned()
        .collect()
}

#[derive(Default)]
struct ChainState {
    entries: Vec<AuditLog>,
    last_hash: String,
}

/// Process-local repository. The chain head lives next to the entries under
/// the same lock.
#[derive(Default)]
pub struct MemoryAuditRepository {
    state: RwLock<ChainState>,
}

impl MemoryAuditRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, ChainState>, AuditError> {
        self.state.read().map_err(|_| AuditError::LockPoisoned)
    }

    /// Rewrite a stored entry without touching any hash.
    #[cfg(test)]
    pub(crate) fn tamper(&self, index: usize, edit: impl FnOnce(&mut AuditLog)) {
        let mut state = self.state.write().unwrap();
        edit(&mut state.entries[index]);
    }
}

impl AuditRepository for MemoryAuditRepository {
    fn append_chained(
        &self,
        link: &dyn Fn(&str) -> Result<ChainLink, AuditError>,
    ) -> Result<AuditLog, AuditError> {
        let mut state = self.state.write().map_err(|_| AuditError::LockPoisoned)?;

        let ChainLink { entry, hash } = link(state.last_hash.as_str())?;
        state.entries.push(entry.clone());
        state.last_hash = hash;

        Ok(entry)
    }

    fn entries(&self) -> Result<Vec<AuditLog>, AuditError> {
        Ok(self.read()?.entries.clone())
    }

    fn last_hash(&self) -> Result<String, AuditError> {
        Ok(self.read()?.last_hash.clone())
    }

    fn snapshot(&self) -> Result<(Vec<AuditLog>, String), AuditError> {
        let state = self.read()?;
        Ok((state.entries.clone(), state.last_hash.clone()))
    }

    fn query_by_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        limit: usize,
    ) -> Result<Vec<AuditLog>, AuditError> {
        let state = self.read()?;
        Ok(newest_first(state.entries.iter(), limit, |e| {
            e.entity_type == entity_type && e.entity_id == entity_id
        }))
    }

    fn query_by_user(&self, user_id: &str, limit: usize) -> Result<Vec<AuditLog>, AuditError> {
        let state = self.read()?;
        Ok(newest_first(state.entries.iter(), limit, |e| {
            e.user_id == user_id
        }))
    }
}
