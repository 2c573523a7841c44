use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use saferide_shared::events::NotificationMessage;

use crate::error::EngineError;

/// Best-effort delivery of push/email notices.
///
/// Callers must treat delivery as fire-and-forget relative to state
/// transitions: a transition that is already durable is never rolled back
/// because a notification failed.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(
        &self,
        tokens: &[String],
        message: &NotificationMessage,
    ) -> Result<(), EngineError>;
}

/// Dispatcher that only logs. Used by the dev binary when no push provider
/// is configured.
pub struct LoggingDispatcher;

#[async_trait]
impl NotificationDispatcher for LoggingDispatcher {
    async fn notify(
        &self,
        tokens: &[String],
        message: &NotificationMessage,
    ) -> Result<(), EngineError> {
        tracing::info!(
            recipients = tokens.len(),
            title = %message.title,
            "notification dispatched"
        );
        Ok(())
    }
}

/// Test double that records deliveries and can be told to fail the next one.
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<(Vec<String>, NotificationMessage)>>,
    fail_next: AtomicBool,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(Vec<String>, NotificationMessage)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_titles(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m)| m.title.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn notify(
        &self,
        tokens: &[String],
        message: &NotificationMessage,
    ) -> Result<(), EngineError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(EngineError::ExternalDependency(
                "push provider unavailable".to_string(),
            ));
        }
        self.sent
            .lock()
            .unwrap()
            .push((tokens.to_vec(), message.clone()));
        Ok(())
    }
}
