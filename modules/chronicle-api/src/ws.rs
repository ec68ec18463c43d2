//! In-memory WebSocket registry: task_id → live connections.
//!
//! Tasks are autonomous; a dropped connection never cancels the background
//! job. Entries are removed when the receiver side is detected gone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use chronicle_common::{ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Serialize)]
pub struct WsMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub request_id: String,
    pub timestamp: chrono::DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_historical: Option<bool>,
}

impl WsMessage {
    pub fn status(step: &str, message: &str, data: Option<serde_json::Value>, request_id: &str) -> Self {
        Self {
            message_type: "status".to_string(),
            message: message.to_string(),
            step: Some(step.to_string()),
            data,
            request_id: request_id.to_string(),
            timestamp: Utc::now(),
            is_historical: None,
        }
    }

    pub fn terminal(message_type: &str, message: &str, request_id: &str) -> Self {
        Self {
            message_type: message_type.to_string(),
            message: message.to_string(),
            step: None,
            data: None,
            request_id: request_id.to_string(),
            timestamp: Utc::now(),
            is_historical: None,
        }
    }
}

#[derive(Default)]
pub struct WsRegistry {
    connections: Mutex<HashMap<Uuid, Vec<mpsc::UnboundedSender<WsMessage>>>>,
}

impl WsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, task_id: Uuid) -> mpsc::UnboundedReceiver<WsMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut connections) = self.connections.lock() {
            connections.entry(task_id).or_default().push(tx);
        }
        rx
    }

    pub fn unregister(&self, task_id: Uuid) {
        if let Ok(mut connections) = self.connections.lock() {
            connections.remove(&task_id);
        }
    }

    /// Push to every live connection for the task, pruning closed ones.
    pub fn push(&self, task_id: Uuid, message: WsMessage) {
        if let Ok(mut connections) = self.connections.lock() {
            if let Some(senders) = connections.get_mut(&task_id) {
                senders.retain(|sender| sender.send(message.clone()).is_ok());
                if senders.is_empty() {
                    connections.remove(&task_id);
                    debug!(%task_id, "last websocket client gone");
                }
            }
        }
    }
}

/// Progress sink that mirrors pipeline progress to connected clients.
pub struct WsProgressSink {
    registry: Arc<WsRegistry>,
}

impl WsProgressSink {
    pub fn new(registry: Arc<WsRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ProgressSink for WsProgressSink {
    async fn report(&self, event: &ProgressEvent) -> anyhow::Result<()> {
        self.registry.push(
            event.task_id,
            WsMessage::status(&event.step, &event.message, event.data.clone(), &event.request_id),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_reaches_registered_client() {
        let registry = WsRegistry::new();
        let task_id = Uuid::new_v4();
        let mut rx = registry.register(task_id);

        registry.push(task_id, WsMessage::status("step", "hello", None, "req"));
        let message = rx.recv().await.unwrap();
        assert_eq!(message.step.as_deref(), Some("step"));
        assert_eq!(message.message, "hello");
    }

    #[tokio::test]
    async fn closed_clients_are_pruned() {
        let registry = WsRegistry::new();
        let task_id = Uuid::new_v4();
        let rx = registry.register(task_id);
        drop(rx);

        registry.push(task_id, WsMessage::terminal("task_completed", "done", "req"));
        // Second push finds no connections left.
        registry.push(task_id, WsMessage::terminal("task_completed", "done", "req"));
        assert!(registry.connections.lock().unwrap().is_empty());
    }
}
