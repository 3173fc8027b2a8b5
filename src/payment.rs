//! Payment records and the status state machine they move through
use crate::timestamp::TimeStamp;
use serde::Serialize;
use std::fmt;

/// Currency applied when a new payment does not name one.
pub const DEFAULT_CURRENCY: &str = "usd";

/// Lifecycle of a payment attempt.
///
/// `Pending` is the only initial state. `Failed`, `Canceled` and `Refunded`
/// are terminal; `Succeeded` can only move on to `Refunded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Canceled,
    Refunded,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 5] = [
        PaymentStatus::Pending,
        PaymentStatus::Succeeded,
        PaymentStatus::Failed,
        PaymentStatus::Canceled,
        PaymentStatus::Refunded,
    ];

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Failed | PaymentStatus::Canceled | PaymentStatus::Refunded
        )
    }

    /// The complete edge set of the state machine.
    #[inline]
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Succeeded)
                | (PaymentStatus::Pending, PaymentStatus::Failed)
                | (PaymentStatus::Pending, PaymentStatus::Canceled)
                | (PaymentStatus::Succeeded, PaymentStatus::Refunded)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Canceled => "canceled",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored payment attempt. Only [`crate::PaymentLedger`] constructs these;
/// every value handed out is an owned copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentRecord {
    pub id: String,
    pub session_id: String,
    pub amount: i64, // minor currency units
    pub fee: i64,    // platform cut, minor currency units
    pub currency: String,
    pub user_id: String,
    pub scene_id: String,
    pub event_id: Option<String>,
    pub connected_account_id: Option<String>,
    pub status: PaymentStatus,
    pub payment_intent_id: Option<String>, // set only on success
    pub failure_reason: Option<String>,    // set only on failure
    pub created_at: TimeStamp,
    pub updated_at: TimeStamp,
}

/// Input for `create_pending`. There is no status field: new records always
/// start out pending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewPayment {
    pub id: Option<String>,
    pub session_id: String,
    pub amount: i64,
    pub fee: i64,
    pub currency: Option<String>,
    pub user_id: String,
    pub scene_id: String,
    pub event_id: Option<String>,
    pub connected_account_id: Option<String>,
    pub created_at: Option<TimeStamp>,
    pub updated_at: Option<TimeStamp>,
}

impl NewPayment {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Self::default()
        }
    }
    pub fn set_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
    pub fn set_amount(mut self, amount: i64) -> Self {
        self.amount = amount;
        self
    }
    pub fn set_fee(mut self, fee: i64) -> Self {
        self.fee = fee;
        self
    }
    pub fn set_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }
    pub fn set_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }
    pub fn set_scene(mut self, scene_id: impl Into<String>) -> Self {
        self.scene_id = scene_id.into();
        self
    }
    pub fn set_event(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }
    pub fn set_connected_account(mut self, account_id: impl Into<String>) -> Self {
        self.connected_account_id = Some(account_id.into());
        self
    }
    pub fn set_created_at(mut self, at: TimeStamp) -> Self {
        self.created_at = Some(at);
        self
    }
}

/// Relationship fields that may be attached after creation.
///
/// `session_id` is only there so a caller echoing a full record back can be
/// checked: naming a session other than the target fails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentMetadata {
    pub session_id: Option<String>,
    pub event_id: Option<String>,
    pub connected_account_id: Option<String>,
}
