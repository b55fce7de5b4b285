pub mod notification;
pub mod orchestration;
pub mod unit_of_work;
pub mod webhook;

pub use notification::{HttpMailer, LogMailer, Mailer, NotificationQueue};
pub use orchestration::{transaction_current_state, OrchestrationError, OrchestrationService};
pub use unit_of_work::AfterCommit;
pub use webhook::{WebhookAck, WebhookError, WebhookService};
