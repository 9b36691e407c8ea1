//! Notifier capability and in-process implementations.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

/// Result type alias for notification delivery.
pub type NotifyResult<T> = Result<T, NotifyError>;

/// Delivery failed before the receiving end could answer.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notify transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        NotifyError::Transport(err.to_string())
    }
}

/// Outbound alert capability. Delivers one formatted text message and
/// reports the receiving end's status code.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> NotifyResult<u16>;
}

/// Drops every message and reports status 0. Used when notifications
/// are disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _message: &str) -> NotifyResult<u16> {
        Ok(0)
    }
}

/// Records messages instead of delivering them. Tests read them back
/// and can make delivery fail to exercise best-effort paths.
#[derive(Default)]
pub struct MemoryNotifier {
    messages: Mutex<Vec<String>>,
    failing: Mutex<bool>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        MemoryNotifier::default()
    }

    /// Make every subsequent delivery fail with a transport error.
    pub async fn set_failing(&self, failing: bool) {
        *self.failing.lock().await = failing;
    }

    pub async fn messages(&self) -> Vec<String> {
        self.messages.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, message: &str) -> NotifyResult<u16> {
        if *self.failing.lock().await {
            return Err(NotifyError::Transport("injected failure".to_string()));
        }
        self.messages.lock().await.push(message.to_string());
        Ok(200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_notifier_records() {
        let notifier = MemoryNotifier::new();
        assert_eq!(notifier.notify("hello").await.unwrap(), 200);
        assert_eq!(notifier.messages().await, vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn memory_notifier_failure_injection() {
        let notifier = MemoryNotifier::new();
        notifier.set_failing(true).await;
        assert!(notifier.notify("lost").await.is_err());
        assert!(notifier.messages().await.is_empty());

        notifier.set_failing(false).await;
        notifier.notify("kept").await.unwrap();
        assert_eq!(notifier.messages().await, vec!["kept".to_string()]);
    }

    #[tokio::test]
    async fn null_notifier_reports_zero() {
        assert_eq!(NullNotifier.notify("ignored").await.unwrap(), 0);
    }
}
