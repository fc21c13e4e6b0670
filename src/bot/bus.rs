use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::dispatcher::TransportError;

/* Notification bus.
 * Cancel/disable style side effects are owned by a separate overlay
 * collaborator; the core only serializes the message and forwards it.
 */

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BusMessage {
    Cancel,
    Disable { duration: u64 },
}

#[async_trait]
pub trait NotificationBus: Send + Sync {
    async fn forward(&self, message: &BusMessage) -> Result<(), TransportError>;
}

// Bus that only logs. Useful when no overlay transport is wired up.
pub struct LogBus;

#[async_trait]
impl NotificationBus for LogBus {
    async fn forward(&self, message: &BusMessage) -> Result<(), TransportError> {
        match serde_json::to_string(message) {
            Ok(wire) => log::info!("bus: {wire}"),
            Err(err) => log::error!("bus message failed to serialize: {err}"),
        }
        Ok(())
    }
}

// Records forwarded messages; used by tests and as a stand-in collaborator.
#[derive(Default)]
pub struct MemoryBus {
    messages: Mutex<Vec<BusMessage>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<BusMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationBus for MemoryBus {
    async fn forward(&self, message: &BusMessage) -> Result<(), TransportError> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }
}
