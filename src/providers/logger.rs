//! Logger transport that only logs messages.
//!
//! Useful for staging environments or dry runs: every send succeeds and
//! emits a tracing event instead of reaching a mail server.

use async_trait::async_trait;

use crate::error::DispatchError;
use crate::message::RenderedMessage;
use crate::transport::{DeliveryId, Transport};

/// Transport that emits tracing events for messages.
pub struct LoggerTransport {
    /// If true, log full message details. If false, just log the recipient summary.
    log_full: bool,
}

impl LoggerTransport {
    /// Create a logger transport with brief output.
    pub fn new() -> Self {
        Self { log_full: false }
    }

    /// Create a logger transport with full message details.
    pub fn full() -> Self {
        Self { log_full: true }
    }

    pub fn log_full(mut self, full: bool) -> Self {
        self.log_full = full;
        self
    }
}

impl Default for LoggerTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for LoggerTransport {
    async fn send(&self, message: &RenderedMessage) -> Result<DeliveryId, DispatchError> {
        message.validate()?;
        let id = DeliveryId::generate();

        if self.log_full {
            tracing::info!(
                delivery_id = %id,
                from = ?message.from.as_ref().map(|a| a.formatted()),
                to = %message.to_email(),
                cc = ?message.cc.iter().map(|a| a.formatted()).collect::<Vec<_>>(),
                bcc = ?message.bcc.iter().map(|a| a.formatted()).collect::<Vec<_>>(),
                subject = %message.subject,
                attachments = ?message.attachments.iter().map(|a| (&a.filename, a.size())).collect::<Vec<_>>(),
                "Message logged (full)"
            );
            tracing::debug!(body = %message.body, "Message body");
        } else {
            tracing::info!(
                delivery_id = %id,
                to = %message.to_email(),
                subject = %message.subject,
                "Message logged"
            );
        }

        Ok(id)
    }

    fn provider_name(&self) -> &'static str {
        "logger"
    }
}
