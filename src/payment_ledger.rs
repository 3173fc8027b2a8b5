//! In-memory payment ledger.
//!
//! Records are keyed by internal id with a secondary unique index on the
//! provider session id. Every mutation (uniqueness check, status change and
//! `updated_at` bump) runs under a single write acquisition, so concurrent
//! callers never observe a half-applied transition.

use crate::error::PaymentError;
use crate::payment::{
    DEFAULT_CURRENCY, NewPayment, PaymentMetadata, PaymentRecord, PaymentStatus,
};
use crate::timestamp::TimeStamp;
use crate::utils::{PAYMENT_HRP, new_uuid_to_bech32};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

#[derive(Default)]
struct LedgerState {
    records: HashMap<String, PaymentRecord>,
    sessions: HashMap<String, String>, // session_id -> record id
}

impl LedgerState {
    fn by_session(&self, session_id: &str) -> Result<&PaymentRecord, PaymentError> {
        let id = self
            .sessions
            .get(session_id)
            .ok_or(PaymentError::RecordNotFound)?;
        self.records.get(id).ok_or(PaymentError::RecordNotFound)
    }

    fn by_session_mut(&mut self, session_id: &str) -> Result<&mut PaymentRecord, PaymentError> {
        let id = self
            .sessions
            .get(session_id)
            .ok_or(PaymentError::RecordNotFound)?;
        self.records.get_mut(id).ok_or(PaymentError::RecordNotFound)
    }
}

pub struct PaymentLedger {
    state: RwLock<LedgerState>,
    default_currency: String,
}

impl Default for PaymentLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentLedger {
    pub fn new() -> Self {
        Self::with_default_currency(DEFAULT_CURRENCY)
    }

    pub fn with_default_currency(currency: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
            default_currency: currency.into(),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerState>, PaymentError> {
        self.state.read().map_err(|_| PaymentError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerState>, PaymentError> {
        self.state.write().map_err(|_| PaymentError::LockPoisoned)
    }

    /// Insert a new record in `pending` state.
    ///
    /// Missing id and timestamps are assigned here; an empty or missing
    /// currency falls back to the ledger default.
    pub fn create_pending(&self, payment: NewPayment) -> Result<PaymentRecord, PaymentError> {
        let mut guard = self.write()?;
        let state = &mut *guard;

        if state.sessions.contains_key(&payment.session_id) {
            warn!(session_id = %payment.session_id, "Duplicate session id rejected");
            return Err(PaymentError::DuplicateSessionId(payment.session_id));
        }

        let id = match payment.id.filter(|id| !id.is_empty()) {
            Some(id) => id,
            None => new_uuid_to_bech32(PAYMENT_HRP)
                .map_err(|e| PaymentError::Identifier(e.to_string()))?,
        };
        if state.records.contains_key(&id) {
            return Err(PaymentError::DuplicateRecordId(id));
        }

        let created_at = payment.created_at.unwrap_or_else(TimeStamp::now);
        let currency = payment
            .currency
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| self.default_currency.clone());

        let record = PaymentRecord {
            id: id.clone(),
            session_id: payment.session_id,
            amount: payment.amount,
            fee: payment.fee,
            currency,
            user_id: payment.user_id,
            scene_id: payment.scene_id,
            event_id: payment.event_id,
            connected_account_id: payment.connected_account_id,
            status: PaymentStatus::Pending,
            payment_intent_id: None,
            failure_reason: None,
            created_at,
            updated_at: payment.updated_at.unwrap_or(created_at),
        };

        state.sessions.insert(record.session_id.clone(), id.clone());
        state.records.insert(id, record.clone());

        info!(
            id = %record.id,
            session_id = %record.session_id,
            amount = record.amount,
            currency = %record.currency,
            "Payment record created"
        );
        Ok(record)
    }

    /// `pending -> succeeded`. Replays with the same intent id are no-ops; a
    /// different intent id is a conflict and never overwrites the stored one.
    pub fn mark_completed(
        &self,
        session_id: &str,
        payment_intent_id: &str,
    ) -> Result<PaymentRecord, PaymentError> {
        let mut state = self.write()?;
        let record = state.by_session_mut(session_id)?;

        if record.status == PaymentStatus::Succeeded {
            return match record.payment_intent_id.as_deref() {
                Some(stored) if stored == payment_intent_id => {
                    debug!(session_id, payment_intent_id, "Completion replay ignored");
                    Ok(record.clone())
                }
                stored => {
                    warn!(
                        session_id,
                        stored = stored.unwrap_or_default(),
                        received = payment_intent_id,
                        "Payment intent mismatch"
                    );
                    Err(PaymentError::PaymentIntentMismatch {
                        stored: stored.unwrap_or_default().to_string(),
                        received: payment_intent_id.to_string(),
                    })
                }
            };
        }

        advance(record, PaymentStatus::Succeeded)?;
        record.payment_intent_id = Some(payment_intent_id.to_string());

        info!(session_id, payment_intent_id, "Payment succeeded");
        Ok(record.clone())
    }

    /// `pending -> failed`. Calling again on a failed record with a new reason
    /// amends the reason; nothing else about the record changes.
    pub fn mark_failed(&self, session_id: &str, reason: &str) -> Result<PaymentRecord, PaymentError> {
        let mut state = self.write()?;
        let record = state.by_session_mut(session_id)?;

        if record.status == PaymentStatus::Failed {
            if record.failure_reason.as_deref() != Some(reason) {
                amend_failure_reason(record, reason);
            } else {
                debug!(session_id, "Failure replay ignored");
            }
            return Ok(record.clone());
        }

        advance(record, PaymentStatus::Failed)?;
        record.failure_reason = Some(reason.to_string());

        info!(session_id, reason, "Payment failed");
        Ok(record.clone())
    }

    /// `pending -> canceled`.
    pub fn mark_canceled(&self, session_id: &str) -> Result<PaymentRecord, PaymentError> {
        self.settle(session_id, PaymentStatus::Canceled)
    }

    /// `succeeded -> refunded`.
    pub fn mark_refunded(&self, session_id: &str) -> Result<PaymentRecord, PaymentError> {
        self.settle(session_id, PaymentStatus::Refunded)
    }

    // transitions that carry no payload: idempotent in the target state
    fn settle(&self, session_id: &str, target: PaymentStatus) -> Result<PaymentRecord, PaymentError> {
        let mut state = self.write()?;
        let record = state.by_session_mut(session_id)?;

        if record.status == target {
            debug!(session_id, status = %target, "Transition replay ignored");
            return Ok(record.clone());
        }

        advance(record, target)?;

        info!(session_id, status = %target, "Payment status changed");
        Ok(record.clone())
    }

    /// Attach relationship metadata. The session id itself is never writable.
    pub fn update_metadata(
        &self,
        session_id: &str,
        metadata: PaymentMetadata,
    ) -> Result<PaymentRecord, PaymentError> {
        let mut state = self.write()?;
        let record = state.by_session_mut(session_id)?;

        if let Some(requested) = metadata.session_id.as_deref() {
            if requested != record.session_id {
                warn!(session_id, requested, "Attempt to change session id");
                return Err(PaymentError::SessionIdImmutable);
            }
        }

        if let Some(event_id) = metadata.event_id {
            record.event_id = Some(event_id);
        }
        if let Some(account_id) = metadata.connected_account_id {
            record.connected_account_id = Some(account_id);
        }
        record.updated_at = TimeStamp::now();

        debug!(session_id, "Payment metadata updated");
        Ok(record.clone())
    }

    pub fn get_by_id(&self, id: &str) -> Result<PaymentRecord, PaymentError> {
        self.read()?
            .records
            .get(id)
            .cloned()
            .ok_or(PaymentError::RecordNotFound)
    }

    pub fn get_by_session_id(&self, session_id: &str) -> Result<PaymentRecord, PaymentError> {
        self.read()?.by_session(session_id).cloned()
    }

    /// Records created by `user_id`, newest first.
    pub fn list_by_user(&self, user_id: &str) -> Result<Vec<PaymentRecord>, PaymentError> {
        let state = self.read()?;
        let mut records: Vec<PaymentRecord> = state
            .records
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(records)
    }

    pub fn len(&self) -> Result<usize, PaymentError> {
        Ok(self.read()?.records.len())
    }

    pub fn is_empty(&self) -> Result<bool, PaymentError> {
        Ok(self.read()?.records.is_empty())
    }
}

fn advance(record: &mut PaymentRecord, next: PaymentStatus) -> Result<(), PaymentError> {
    if !record.status.can_transition_to(next) {
        warn!(
            session_id = %record.session_id,
            from = %record.status,
            to = %next,
            "Invalid status transition"
        );
        return Err(PaymentError::InvalidStatusTransition {
            from: record.status,
            to: next,
        });
    }
    record.status = next;
    record.updated_at = TimeStamp::now();
    Ok(())
}

// the only in-place edit of a terminal record
fn amend_failure_reason(record: &mut PaymentRecord, reason: &str) {
    info!(
        session_id = %record.session_id,
        previous = record.failure_reason.as_deref().unwrap_or_default(),
        reason,
        "Failure reason amended"
    );
    record.failure_reason = Some(reason.to_string());
    record.updated_at = TimeStamp::now();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(ledger: &PaymentLedger, session_id: &str) -> PaymentRecord {
        ledger
            .create_pending(
                NewPayment::new(session_id)
                    .set_amount(1000)
                    .set_fee(100)
                    .set_user("user_1")
                    .set_scene("scene_1"),
            )
            .unwrap()
    }

    #[test]
    fn create_assigns_defaults() {
        let ledger = PaymentLedger::new();
        let record = pending(&ledger, "cs_1");

        assert!(record.id.starts_with("pay1"));
        assert_eq!(record.status, PaymentStatus::Pending);
        assert_eq!(record.currency, "usd");
        assert_eq!(record.created_at, record.updated_at);
        assert_eq!(record.payment_intent_id, None);
        assert_eq!(record.failure_reason, None);
    }

    #[test]
    fn create_keeps_supplied_id_and_currency() {
        let ledger = PaymentLedger::with_default_currency("eur");
        let at = TimeStamp::new_with(2024, 6, 1, 12, 0, 0).unwrap();
        let record = ledger
            .create_pending(
                NewPayment::new("cs_1")
                    .set_id("custom")
                    .set_currency("gbp")
                    .set_created_at(at),
            )
            .unwrap();

        assert_eq!(record.id, "custom");
        assert_eq!(record.currency, "gbp");
        assert_eq!(record.created_at, at);
        assert_eq!(record.updated_at, at);

        let defaulted = ledger
            .create_pending(NewPayment::new("cs_2").set_currency(""))
            .unwrap();
        assert_eq!(defaulted.currency, "eur");
    }

    #[test]
    fn duplicate_record_id_is_rejected() {
        let ledger = PaymentLedger::new();
        ledger
            .create_pending(NewPayment::new("cs_1").set_id("same"))
            .unwrap();
        let err = ledger
            .create_pending(NewPayment::new("cs_2").set_id("same"))
            .unwrap_err();

        assert_eq!(err, PaymentError::DuplicateRecordId("same".into()));
        assert!(matches!(
            ledger.get_by_session_id("cs_2"),
            Err(PaymentError::RecordNotFound)
        ));
    }

    #[test]
    fn duplicate_session_keeps_first_payload() {
        let ledger = PaymentLedger::new();
        pending(&ledger, "cs_1");

        let err = ledger
            .create_pending(NewPayment::new("cs_1").set_amount(5))
            .unwrap_err();
        assert_eq!(err, PaymentError::DuplicateSessionId("cs_1".into()));
        assert_eq!(ledger.get_by_session_id("cs_1").unwrap().amount, 1000);
        assert_eq!(ledger.len().unwrap(), 1);
    }

    #[test]
    fn unknown_session_is_not_found() {
        let ledger = PaymentLedger::new();
        assert_eq!(
            ledger.mark_completed("nope", "pi_1").unwrap_err(),
            PaymentError::RecordNotFound
        );
        assert_eq!(
            ledger.mark_failed("nope", "x").unwrap_err(),
            PaymentError::RecordNotFound
        );
        assert_eq!(
            ledger.mark_canceled("nope").unwrap_err(),
            PaymentError::RecordNotFound
        );
        assert_eq!(
            ledger.mark_refunded("nope").unwrap_err(),
            PaymentError::RecordNotFound
        );
        assert_eq!(
            ledger.get_by_id("nope").unwrap_err(),
            PaymentError::RecordNotFound
        );
    }

    #[test]
    fn completion_is_idempotent_for_same_intent() {
        let ledger = PaymentLedger::new();
        pending(&ledger, "cs_1");

        let first = ledger.mark_completed("cs_1", "pi_1").unwrap();
        let second = ledger.mark_completed("cs_1", "pi_1").unwrap();

        assert_eq!(first, second);
        assert_eq!(second.status, PaymentStatus::Succeeded);
        assert_eq!(second.payment_intent_id.as_deref(), Some("pi_1"));
    }

    #[test]
    fn completion_with_other_intent_conflicts() {
        let ledger = PaymentLedger::new();
        pending(&ledger, "cs_1");
        ledger.mark_completed("cs_1", "pi_1").unwrap();

        let err = ledger.mark_completed("cs_1", "pi_2").unwrap_err();
        assert_eq!(
            err,
            PaymentError::PaymentIntentMismatch {
                stored: "pi_1".into(),
                received: "pi_2".into(),
            }
        );
        let stored = ledger.get_by_session_id("cs_1").unwrap();
        assert_eq!(stored.payment_intent_id.as_deref(), Some("pi_1"));
    }

    #[test]
    fn completion_after_cancel_is_invalid() {
        let ledger = PaymentLedger::new();
        pending(&ledger, "cs_1");
        ledger.mark_canceled("cs_1").unwrap();

        let err = ledger.mark_completed("cs_1", "pi_1").unwrap_err();
        assert_eq!(
            err,
            PaymentError::InvalidStatusTransition {
                from: PaymentStatus::Canceled,
                to: PaymentStatus::Succeeded,
            }
        );
        assert_eq!(
            ledger.get_by_session_id("cs_1").unwrap().payment_intent_id,
            None
        );
    }

    #[test]
    fn failure_reason_is_amended_in_place() {
        let ledger = PaymentLedger::new();
        pending(&ledger, "cs_1");

        let failed = ledger.mark_failed("cs_1", "card_declined").unwrap();
        let replay = ledger.mark_failed("cs_1", "card_declined").unwrap();
        assert_eq!(failed, replay);

        let amended = ledger.mark_failed("cs_1", "insufficient_funds").unwrap();
        assert_eq!(amended.status, PaymentStatus::Failed);
        assert_eq!(amended.failure_reason.as_deref(), Some("insufficient_funds"));
        assert!(amended.updated_at >= failed.updated_at);
        assert_eq!(amended.created_at, failed.created_at);
    }

    #[test]
    fn failure_after_success_is_invalid() {
        let ledger = PaymentLedger::new();
        pending(&ledger, "cs_1");
        ledger.mark_completed("cs_1", "pi_1").unwrap();

        assert!(matches!(
            ledger.mark_failed("cs_1", "late"),
            Err(PaymentError::InvalidStatusTransition { .. })
        ));
        let stored = ledger.get_by_session_id("cs_1").unwrap();
        assert_eq!(stored.failure_reason, None);
        assert_eq!(stored.status, PaymentStatus::Succeeded);
    }

    #[test]
    fn refund_requires_success() {
        let ledger = PaymentLedger::new();
        pending(&ledger, "cs_1");

        assert_eq!(
            ledger.mark_refunded("cs_1").unwrap_err(),
            PaymentError::InvalidStatusTransition {
                from: PaymentStatus::Pending,
                to: PaymentStatus::Refunded,
            }
        );

        ledger.mark_completed("cs_1", "pi_1").unwrap();
        assert_eq!(
            ledger.mark_refunded("cs_1").unwrap().status,
            PaymentStatus::Refunded
        );
        // repeat refund is a no-op
        assert_eq!(
            ledger.mark_refunded("cs_1").unwrap().status,
            PaymentStatus::Refunded
        );
        // the intent id survives the refund
        assert_eq!(
            ledger.get_by_session_id("cs_1").unwrap().payment_intent_id.as_deref(),
            Some("pi_1")
        );
    }

    #[test]
    fn cancel_is_idempotent() {
        let ledger = PaymentLedger::new();
        pending(&ledger, "cs_1");

        let first = ledger.mark_canceled("cs_1").unwrap();
        let second = ledger.mark_canceled("cs_1").unwrap();
        assert_eq!(first, second);
        assert_eq!(second.status, PaymentStatus::Canceled);
    }

    #[test]
    fn returned_records_do_not_alias_storage() {
        let ledger = PaymentLedger::new();
        let created = pending(&ledger, "cs_1");
        ledger.mark_completed("cs_1", "pi_1").unwrap();

        let mut copy = ledger.get_by_id(&created.id).unwrap();
        copy.payment_intent_id = Some("pi_forged".into());
        copy.event_id = Some("evt_forged".into());
        copy.status = PaymentStatus::Refunded;

        let fresh = ledger.get_by_id(&created.id).unwrap();
        assert_eq!(fresh.payment_intent_id.as_deref(), Some("pi_1"));
        assert_eq!(fresh.event_id, None);
        assert_eq!(fresh.status, PaymentStatus::Succeeded);
    }

    #[test]
    fn metadata_cannot_move_session() {
        let ledger = PaymentLedger::new();
        pending(&ledger, "cs_1");

        let err = ledger
            .update_metadata(
                "cs_1",
                PaymentMetadata {
                    session_id: Some("cs_other".into()),
                    event_id: Some("event_9".into()),
                    ..PaymentMetadata::default()
                },
            )
            .unwrap_err();
        assert_eq!(err, PaymentError::SessionIdImmutable);
        assert_eq!(ledger.get_by_session_id("cs_1").unwrap().event_id, None);

        let updated = ledger
            .update_metadata(
                "cs_1",
                PaymentMetadata {
                    session_id: Some("cs_1".into()),
                    event_id: Some("event_9".into()),
                    connected_account_id: Some("acct_1".into()),
                },
            )
            .unwrap();
        assert_eq!(updated.session_id, "cs_1");
        assert_eq!(updated.event_id.as_deref(), Some("event_9"));
        assert_eq!(updated.connected_account_id.as_deref(), Some("acct_1"));
    }

    #[test]
    fn list_by_user_is_newest_first() {
        let ledger = PaymentLedger::new();
        for (session, day) in [("cs_a", 1), ("cs_b", 3), ("cs_c", 2)] {
            ledger
                .create_pending(
                    NewPayment::new(session)
                        .set_user("user_1")
                        .set_created_at(TimeStamp::new_with(2024, 1, day, 0, 0, 0).unwrap()),
                )
                .unwrap();
        }
        ledger
            .create_pending(NewPayment::new("cs_x").set_user("user_2"))
            .unwrap();

        let sessions: Vec<String> = ledger
            .list_by_user("user_1")
            .unwrap()
            .into_iter()
            .map(|r| r.session_id)
            .collect();
        assert_eq!(sessions, vec!["cs_b", "cs_c", "cs_a"]);
    }
}
