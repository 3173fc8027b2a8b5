pub mod audit;
pub mod config;
pub mod error;
pub mod logging;
pub mod payment;
pub mod payment_ledger;
pub mod service;
pub mod timestamp;
pub mod utils;
pub mod webhook;

pub use audit::AuditTrail;
pub use config::LedgerConfig;
pub use error::{AuditError, ConfigError, PaymentError, WebhookError};
pub use payment::{NewPayment, PaymentMetadata, PaymentRecord, PaymentStatus};
pub use payment_ledger::PaymentLedger;
pub use service::{EventDisposition, LedgerService, ProviderEvent, ProviderOutcome, ServiceError};
pub use timestamp::TimeStamp;
pub use webhook::{WebhookDedupLedger, WebhookEvent};
