//! Transport trait and delivery identifiers.
//!
//! The trait uses `#[async_trait]` because the dispatcher holds its
//! transport as `Arc<dyn Transport>`, chosen at runtime from configuration.
//! Sending is network-bound, so the boxed future is never the bottleneck.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DispatchError;
use crate::message::RenderedMessage;

/// Identifier assigned to a delivered message by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryId(pub String);

impl DeliveryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random identifier, for transports that do not return one.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An outbound message transport.
///
/// Implementations send one message per call and report failures as
/// [`DispatchError::Transport`] with a classified code, so the retry layer
/// can tell transient failures from permanent ones.
///
/// ```ignore
/// use bulletin::{RenderedMessage, Transport};
/// use bulletin::providers::LoggerTransport;
///
/// let transport = LoggerTransport::new();
/// let id = transport.send(&message).await?;
/// println!("delivered as {id}");
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one message and return its delivery identifier.
    ///
    /// Fails with [`DispatchError::InvalidMessage`] if the message lacks a
    /// destination or subject.
    async fn send(&self, message: &RenderedMessage) -> Result<DeliveryId, DispatchError>;

    /// Transport name (for logging/metrics).
    fn provider_name(&self) -> &'static str {
        "unknown"
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(&self, message: &RenderedMessage) -> Result<DeliveryId, DispatchError> {
        (**self).send(message).await
    }

    fn provider_name(&self) -> &'static str {
        (**self).provider_name()
    }
}
