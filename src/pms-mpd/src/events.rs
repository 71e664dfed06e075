//! Engine events for whatever renders the mirrored state.
//!
//! Publishing never blocks and silently drops events nobody listens to.

use crate::connection::ProtocolVersion;
use serde::Serialize;
use tokio::sync::broadcast;

pub const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    Connected {
        host: String,
        port: u16,
        version: ProtocolVersion,
    },
    /// The connection dropped and all mirrored state was reset.
    Disconnected,
    StatusUpdated,
    StatsUpdated,
    QueueSynced {
        version: u64,
        len: usize,
    },
    LibrarySynced {
        version: u64,
        len: usize,
    },
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: EngineEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
