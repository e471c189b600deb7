//! In-memory storage of delivered messages for the local transport.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::message::RenderedMessage;
use crate::transport::DeliveryId;

/// A delivered message with metadata.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: DeliveryId,
    pub message: RenderedMessage,
    pub sent_at: DateTime<Utc>,
}

/// Thread-safe in-memory message store, in delivery order.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    messages: HashMap<DeliveryId, StoredMessage>,
    order: Vec<DeliveryId>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create storage wrapped in an Arc for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Store a message and return its new delivery id.
    pub fn push(&self, message: RenderedMessage) -> DeliveryId {
        let id = DeliveryId::generate();
        let stored = StoredMessage {
            id: id.clone(),
            message,
            sent_at: Utc::now(),
        };

        let mut inner = self.inner.write();
        inner.messages.insert(id.clone(), stored);
        inner.order.push(id.clone());
        id
    }

    pub fn get(&self, id: &DeliveryId) -> Option<StoredMessage> {
        self.inner.read().messages.get(id).cloned()
    }

    /// All stored messages, oldest first.
    pub fn all(&self) -> Vec<StoredMessage> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.messages.get(id).cloned())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.inner.read().messages.len()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.messages.clear();
        inner.order.clear();
    }

    /// Remove and return all stored messages, oldest first.
    pub fn flush(&self) -> Vec<StoredMessage> {
        let mut inner = self.inner.write();
        let order = std::mem::take(&mut inner.order);
        let mut messages = std::mem::take(&mut inner.messages);
        order
            .into_iter()
            .filter_map(|id| messages.remove(&id))
            .collect()
    }
}
