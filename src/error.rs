//! Error types for the three ledgers.
//!
//! Every variant is returned to the immediate caller; nothing here is retried
//! or swallowed. `code()` gives the stable identifier an outer handler maps
//! onto its response body.

use crate::payment::PaymentStatus;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    #[error("Payment record not found")]
    RecordNotFound,
    #[error("A payment record for session {0} already exists")]
    DuplicateSessionId(String),
    #[error("A payment record with id {0} already exists")]
    DuplicateRecordId(String),
    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },
    #[error("Payment intent mismatch: stored {stored}, received {received}")]
    PaymentIntentMismatch { stored: String, received: String },
    #[error("Session id cannot change once assigned")]
    SessionIdImmutable,
    #[error("Failed to generate record id: {0}")]
    Identifier(String),
    #[error("Payment ledger lock poisoned")]
    LockPoisoned,
}

impl PaymentError {
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::RecordNotFound => "record_not_found",
            PaymentError::DuplicateSessionId(_) => "duplicate_session_id",
            PaymentError::DuplicateRecordId(_) => "duplicate_record_id",
            PaymentError::InvalidStatusTransition { .. } => "invalid_status_transition",
            PaymentError::PaymentIntentMismatch { .. } => "payment_intent_mismatch",
            PaymentError::SessionIdImmutable => "session_id_immutable",
            PaymentError::Identifier(_) => "internal",
            PaymentError::LockPoisoned => "internal",
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WebhookError {
    // expected on redelivery: the caller skips the event
    #[error("Webhook event {0} was already processed")]
    EventAlreadyProcessed(String),
    #[error("Webhook ledger lock poisoned")]
    LockPoisoned,
}

impl WebhookError {
    pub fn code(&self) -> &'static str {
        match self {
            WebhookError::EventAlreadyProcessed(_) => "event_already_processed",
            WebhookError::LockPoisoned => "internal",
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AuditError {
    #[error("Audit trail has no backing repository")]
    NilRepository,
    #[error("Invalid audit entity type: {0:?}")]
    InvalidEntityType(String),
    #[error("Audit entity id must not be empty")]
    InvalidEntityId,
    #[error("Invalid audit action: {0:?}")]
    InvalidAction(String),
    #[error("Failed to encode audit entry: {0}")]
    Encoding(String),
    #[error("Audit storage failure: {0}")]
    Storage(String),
    #[error("Audit export failed: {0}")]
    Export(String),
    #[error("Failed to generate audit id: {0}")]
    Identifier(String),
    #[error("Audit repository lock poisoned")]
    LockPoisoned,
}

impl AuditError {
    pub fn code(&self) -> &'static str {
        match self {
            AuditError::NilRepository => "audit_unavailable",
            AuditError::InvalidEntityType(_) => "invalid_entity_type",
            AuditError::InvalidEntityId => "invalid_entity_id",
            AuditError::InvalidAction(_) => "invalid_action",
            AuditError::Export(_) => "export_failed",
            AuditError::Encoding(_)
            | AuditError::Storage(_)
            | AuditError::Identifier(_)
            | AuditError::LockPoisoned => "internal",
        }
    }
}

impl From<sled::Error> for AuditError {
    fn from(value: sled::Error) -> Self {
        AuditError::Storage(value.to_string())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(PaymentError::RecordNotFound.code(), "record_not_found");
        assert_eq!(
            PaymentError::InvalidStatusTransition {
                from: PaymentStatus::Failed,
                to: PaymentStatus::Succeeded,
            }
            .code(),
            "invalid_status_transition"
        );
        assert_eq!(
            WebhookError::EventAlreadyProcessed("evt_1".into()).code(),
            "event_already_processed"
        );
        assert_eq!(AuditError::NilRepository.code(), "audit_unavailable");
    }

    #[test]
    fn internal_detail_stays_out_of_codes() {
        assert_eq!(AuditError::Storage("disk full".into()).code(), "internal");
        assert_eq!(PaymentError::LockPoisoned.code(), "internal");
    }

    #[test]
    fn transition_message_names_both_states() {
        let err = PaymentError::InvalidStatusTransition {
            from: PaymentStatus::Refunded,
            to: PaymentStatus::Failed,
        };
        assert_eq!(
            err.to_string(),
            "Invalid status transition from refunded to failed"
        );
    }
}
