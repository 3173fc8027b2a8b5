//! Service layer composing the three ledgers the way a webhook handler uses them
use crate::audit::{
    AuditLog, AuditTrail, ExportFilter, NewAuditEntry, RetentionPolicy, SledAuditRepository,
};
use crate::config::{AuditBackend, LedgerConfig};
use crate::error::{AuditError, PaymentError, WebhookError};
use crate::payment::PaymentRecord;
use crate::payment_ledger::PaymentLedger;
use crate::webhook::WebhookDedupLedger;
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error(transparent)]
    Webhook(#[from] WebhookError),
    #[error(transparent)]
    Audit(#[from] AuditError),
}

impl ServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Payment(e) => e.code(),
            ServiceError::Webhook(e) => e.code(),
            ServiceError::Audit(e) => e.code(),
        }
    }
}

/// What the provider says happened to a checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome {
    Completed { payment_intent_id: String },
    Failed { reason: String },
    Canceled,
    Refunded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEvent {
    pub event_id: String,
    pub event_type: String,
    pub session_id: String,
    pub outcome: ProviderOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDisposition {
    Applied(PaymentRecord),
    /// Delivery seen before; the payment ledger was not touched.
    Duplicate,
}

pub struct LedgerService {
    payments: PaymentLedger,
    webhooks: WebhookDedupLedger,
    audit: AuditTrail,
    retention: RetentionPolicy,
}

impl LedgerService {
    pub fn new(payments: PaymentLedger, webhooks: WebhookDedupLedger, audit: AuditTrail) -> Self {
        Self {
            payments,
            webhooks,
            audit,
            retention: RetentionPolicy::default(),
        }
    }

    /// Address retention window applied to audit exports.
    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// Build the stores described by `config`, opening the sled database when
    /// the audit backend asks for one.
    pub fn from_config(config: &LedgerConfig) -> anyhow::Result<Self> {
        let audit = match &config.audit.backend {
            AuditBackend::Memory => AuditTrail::in_memory(),
            AuditBackend::Sled { path } => {
                let db = sled::open(path)
                    .with_context(|| format!("opening audit database at {}", path.display()))?;
                AuditTrail::new(Arc::new(SledAuditRepository::open(&db)?))
            }
            AuditBackend::Disabled => {
                warn!("Audit backend disabled; audited operations will be refused");
                AuditTrail::default()
            }
        }
        .anonymize_ip_on_write(config.audit.anonymize_ip_on_write);

        Ok(Self::new(
            PaymentLedger::with_default_currency(config.default_currency.clone()),
            WebhookDedupLedger::new(),
            audit,
        )
        .with_retention(config.retention_policy()))
    }

    pub fn payments(&self) -> &PaymentLedger {
        &self.payments
    }

    pub fn webhooks(&self) -> &WebhookDedupLedger {
        &self.webhooks
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Export the audit trail with addresses past the retention window
    /// anonymized as of now. A filter that already carries its own redaction
    /// keeps it.
    pub fn export_audit(&self, filter: ExportFilter) -> Result<String, ServiceError> {
        let filter = match filter.redaction {
            Some(_) => filter,
            None => filter.redact_expired(self.retention, Utc::now()),
        };
        Ok(self.audit.export(&filter)?)
    }

    /// Record the delivery, then apply it. The event id is marked before the
    /// transition runs, so a transition that fails is not re-attempted when
    /// the provider redelivers.
    pub fn apply_provider_event(&self, event: ProviderEvent) -> Result<EventDisposition, ServiceError> {
        match self.webhooks.record_event(&event.event_id, &event.event_type) {
            Ok(_) => {}
            Err(WebhookError::EventAlreadyProcessed(_)) => {
                debug!(event_id = %event.event_id, "Skipping redelivered event");
                return Ok(EventDisposition::Duplicate);
            }
            Err(e) => return Err(e.into()),
        }

        let session_id = event.session_id.as_str();
        let record = match &event.outcome {
            ProviderOutcome::Completed { payment_intent_id } => {
                self.payments.mark_completed(session_id, payment_intent_id)
            }
            ProviderOutcome::Failed { reason } => self.payments.mark_failed(session_id, reason),
            ProviderOutcome::Canceled => self.payments.mark_canceled(session_id),
            ProviderOutcome::Refunded => self.payments.mark_refunded(session_id),
        }
        .inspect_err(|err| {
            warn!(
                event_id = %event.event_id,
                session_id,
                error = %err,
                "Provider event could not be applied"
            );
        })?;

        info!(
            event_id = %event.event_id,
            session_id,
            status = %record.status,
            "Provider event applied"
        );
        Ok(EventDisposition::Applied(record))
    }

    /// Log `entry`, then run `op`. If the entry cannot be recorded `op` never
    /// runs.
    pub fn audited<T, E>(
        &self,
        entry: NewAuditEntry,
        op: impl FnOnce(&AuditLog) -> Result<T, E>,
    ) -> Result<T, ServiceError>
    where
        ServiceError: From<E>,
    {
        let logged = self.audit.log_access(entry)?;
        Ok(op(&logged)?)
    }
}
