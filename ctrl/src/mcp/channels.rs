//! Outbound message queues for SSE streams, one per connected stream

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Event sent over SSE stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseEvent {
    pub event_type: String,
    pub data: String,
}

impl SseEvent {
    pub fn message(data: impl Into<String>) -> Self {
        Self {
            event_type: "message".to_string(),
            data: data.into(),
        }
    }
}

/// Maps stream ids to the sending half of their outbound queue
#[derive(Clone, Default)]
pub struct SseChannels {
    channels: Arc<RwLock<HashMap<String, mpsc::UnboundedSender<SseEvent>>>>,
}

/// Registration of a live stream. Dropping it deregisters the queue.
pub struct ChannelGuard {
    id: String,
    channels: SseChannels,
}

impl ChannelGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        self.channels.remove(&self.id);
        tracing::debug!("SSE stream {} deregistered", self.id);
    }
}

impl SseChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new stream under a fresh id
    pub fn open(&self) -> (ChannelGuard, mpsc::UnboundedReceiver<SseEvent>) {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.write().insert(id.clone(), tx);
        crate::metrics::set_sse_streams_active(self.active_count());
        let guard = ChannelGuard {
            id,
            channels: self.clone(),
        };
        (guard, rx)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.channels.read().contains_key(id)
    }

    /// Queue an event for a stream. Returns false when the stream is gone;
    /// a stream closing concurrently is not an error.
    pub fn send(&self, id: &str, event: SseEvent) -> bool {
        let sender = self.channels.read().get(id).cloned();
        match sender {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    fn remove(&self, id: &str) {
        self.channels.write().remove(id);
        crate::metrics::set_sse_streams_active(self.active_count());
    }

    /// Drop every sender so that all open streams end. Used on shutdown.
    pub fn close_all(&self) {
        let drained = {
            let mut channels = self.channels.write();
            channels.drain().count()
        };
        if drained > 0 {
            tracing::info!("Closed {} SSE streams", drained);
        }
        crate::metrics::set_sse_streams_active(0);
    }

    pub fn active_count(&self) -> usize {
        self.channels.read().len()
    }
}
