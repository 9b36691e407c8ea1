//! ember-notify — outbound alerting for embergrid.
//!
//! Alerts are best-effort: the orchestrator and watchdog log delivery
//! failures and move on, so nothing here may block or escalate into the
//! provisioning flow. The concrete notifier is injected at construction
//! time; there is no process-wide default.

pub mod message;
pub mod notifier;
pub mod webhook;

pub use message::{shutdown_message, spawn_message};
pub use notifier::{MemoryNotifier, Notifier, NotifyError, NotifyResult, NullNotifier};
pub use webhook::WebhookNotifier;
