//! Exactly-once ledger of provider webhook deliveries.
//!
//! A notification handler calls [`WebhookDedupLedger::record_event`] before it
//! touches the payment ledger and skips the event entirely when the call
//! reports [`WebhookError::EventAlreadyProcessed`].

use crate::error::WebhookError;
use crate::timestamp::TimeStamp;
use serde::Serialize;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookEvent {
    pub event_id: String,
    pub event_type: String,
    pub processed_at: TimeStamp,
}

#[derive(Default)]
pub struct WebhookDedupLedger {
    events: RwLock<HashMap<String, WebhookEvent>>,
}

impl WebhookDedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, WebhookEvent>>, WebhookError> {
        self.events.read().map_err(|_| WebhookError::LockPoisoned)
    }

    /// Record `event_id` as processed. Only the first call for a given id
    /// succeeds; the event type of later calls is irrelevant. Empty ids are
    /// accepted as ordinary keys.
    pub fn record_event(&self, event_id: &str, event_type: &str) -> Result<WebhookEvent, WebhookError> {
        let mut events = self.events.write().map_err(|_| WebhookError::LockPoisoned)?;

        match events.entry(event_id.to_string()) {
            Entry::Occupied(existing) => {
                debug!(
                    event_id,
                    event_type,
                    first_type = %existing.get().event_type,
                    "Duplicate webhook delivery"
                );
                Err(WebhookError::EventAlreadyProcessed(event_id.to_string()))
            }
            Entry::Vacant(slot) => {
                let event = slot.insert(WebhookEvent {
                    event_id: event_id.to_string(),
                    event_type: event_type.to_string(),
                    processed_at: TimeStamp::now(),
                });
                info!(event_id, event_type, "Webhook event recorded");
                Ok(event.clone())
            }
        }
    }

    pub fn has_processed(&self, event_id: &str) -> Result<bool, WebhookError> {
        Ok(self.read()?.contains_key(event_id))
    }

    pub fn get(&self, event_id: &str) -> Result<Option<WebhookEvent>, WebhookError> {
        Ok(self.read()?.get(event_id).cloned())
    }

    pub fn len(&self) -> Result<usize, WebhookError> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, WebhookError> {
        Ok(self.read()?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_delivery_is_rejected() {
        let ledger = WebhookDedupLedger::new();

        let event = ledger
            .record_event("evt_1", "payment_intent.succeeded")
            .unwrap();
        assert_eq!(event.event_type, "payment_intent.succeeded");

        let err = ledger
            .record_event("evt_1", "payment_intent.succeeded")
            .unwrap_err();
        assert_eq!(err, WebhookError::EventAlreadyProcessed("evt_1".into()));
    }

    #[test]
    fn event_type_does_not_matter_for_duplicates() {
        let ledger = WebhookDedupLedger::new();
        ledger.record_event("evt_1", "checkout.session.completed").unwrap();

        assert!(ledger.record_event("evt_1", "charge.refunded").is_err());
        // the first recorded type is kept
        let stored = ledger.get("evt_1").unwrap().unwrap();
        assert_eq!(stored.event_type, "checkout.session.completed");
    }

    #[test]
    fn has_processed_has_no_side_effect() {
        let ledger = WebhookDedupLedger::new();

        assert!(!ledger.has_processed("evt_1").unwrap());
        assert!(!ledger.has_processed("evt_1").unwrap());
        assert!(ledger.is_empty().unwrap());

        // still recordable after the reads
        ledger.record_event("evt_1", "t").unwrap();
        assert!(ledger.has_processed("evt_1").unwrap());
        assert_eq!(ledger.len().unwrap(), 1);
    }

    #[test]
    fn empty_event_id_is_a_valid_key() {
        let ledger = WebhookDedupLedger::new();

        ledger.record_event("", "t").unwrap();
        assert!(ledger.has_processed("").unwrap());
        assert_eq!(
            ledger.record_event("", "t").unwrap_err(),
            WebhookError::EventAlreadyProcessed(String::new())
        );
    }
}
