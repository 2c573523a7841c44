pub mod event;
pub mod gateway;
pub mod ledger;
pub mod reconcile;
pub mod signature;

pub use ledger::IdempotencyLedger;
pub use reconcile::{PaymentReconciler, WebhookAck};
