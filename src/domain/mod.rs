pub mod customer;
pub mod transaction;
pub mod webhook;

pub use customer::{Address, BillingProfile, Customer, PreconditionError};
pub use transaction::{Transaction, TransactionState};
pub use webhook::{TransactionFlags, WebhookPayload};
