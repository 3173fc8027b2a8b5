//! Append-only, hash-chained audit trail of sensitive access events.
//!
//! Logging is fail-closed: when an entry cannot be validated or stored the
//! error goes back to the caller, and the caller must not carry on with the
//! audited operation.

pub mod chain;
pub mod entry;
pub mod export;
pub mod repository;
pub mod retention;
pub mod sled_store;

use crate::error::AuditError;
use crate::timestamp::TimeStamp;
use crate::utils::{AUDIT_HRP, new_uuid_to_bech32};
use std::sync::Arc;
use tracing::{debug, error, info};

pub use chain::ChainLink;
pub use entry::{AuditAction, AuditLog, EntityType, NewAuditEntry, Outcome};
pub use export::{ExportFilter, ExportFormat};
pub use repository::{AuditRepository, MemoryAuditRepository};
pub use retention::{RetentionPolicy, anonymize_ip};
pub use sled_store::SledAuditRepository;

/// Entry point for recording and inspecting audit events.
///
/// A trail built with `Default` has no repository; every call on it fails
/// with [`AuditError::NilRepository`].
#[derive(Default, Clone)]
pub struct AuditTrail {
    repository: Option<Arc<dyn AuditRepository>>,
    anonymize_ip_on_write: bool,
}

impl AuditTrail {
    pub fn new(repository: Arc<dyn AuditRepository>) -> Self {
        Self {
            repository: Some(repository),
            anonymize_ip_on_write: false,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryAuditRepository::new()))
    }

    /// Anonymize network addresses before they are hashed and stored.
    pub fn anonymize_ip_on_write(mut self, enabled: bool) -> Self {
        self.anonymize_ip_on_write = enabled;
        self
    }

    fn repository(&self) -> Result<&dyn AuditRepository, AuditError> {
        self.repository.as_deref().ok_or(AuditError::NilRepository)
    }

    /// Validate, chain and store one access event.
    pub fn log_access(&self, entry: NewAuditEntry) -> Result<AuditLog, AuditError> {
        let repository = self.repository().inspect_err(|_| {
            error!(entity_id = %entry.entity_id, "Audit trail has no repository");
        })?;
        let (entity_type, action) = entry.validate().inspect_err(|err| {
            debug!(error = %err, "Audit entry rejected");
        })?;

        let id = new_uuid_to_bech32(AUDIT_HRP).map_err(|e| AuditError::Identifier(e.to_string()))?;
        let ip_address = match entry.ip_address {
            Some(addr) if self.anonymize_ip_on_write => anonymize_ip(&addr),
            other => other,
        };

        let draft = AuditLog {
            id,
            user_id: entry.user_id,
            entity_type,
            entity_id: entry.entity_id,
            action,
            outcome: entry.outcome.unwrap_or_default(),
            created_at: entry.created_at.unwrap_or_else(TimeStamp::now),
            request_id: entry.request_id,
            ip_address,
            user_agent: entry.user_agent,
            previous_hash: String::new(),
        };

        let stored = repository
            .append_chained(&|last_hash| chain::link(draft.clone(), last_hash))
            .inspect_err(|err| {
                error!(id = %draft.id, error = %err, "Failed to append audit entry");
            })?;

        info!(
            id = %stored.id,
            user_id = %stored.user_id,
            entity_type = %stored.entity_type,
            entity_id = %stored.entity_id,
            action = %stored.action,
            "Audit entry recorded"
        );
        Ok(stored)
    }

    /// Entries for one entity, newest first. `limit == 0` returns all.
    pub fn query_by_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        limit: usize,
    ) -> Result<Vec<AuditLog>, AuditError> {
        self.repository()?
            .query_by_entity(entity_type, entity_id, limit)
    }

    /// Entries recorded for one acting user, newest first. `limit == 0` returns all.
    pub fn query_by_user(&self, user_id: &str, limit: usize) -> Result<Vec<AuditLog>, AuditError> {
        self.repository()?.query_by_user(user_id, limit)
    }

    pub fn last_hash(&self) -> Result<String, AuditError> {
        self.repository()?.last_hash()
    }

    /// Recompute every hash in insertion order. `Ok(false)` means the stored
    /// history no longer matches what was chained.
    pub fn verify_hash_chain(&self) -> Result<bool, AuditError> {
        let (entries, last_hash) = self.repository()?.snapshot()?;

        let intact = chain::verify(&entries, &last_hash);
        if !intact {
            error!(entries = entries.len(), "Audit hash chain verification failed");
        }
        Ok(intact)
    }

    pub fn export(&self, filter: &ExportFilter) -> Result<String, AuditError> {
        let entries = self.repository()?.entries()?;
        export::export(&entries, filter)
    }
}
