//! Local transport for development and testing.
//!
//! Stores delivered messages in memory for programmatic assertions, and can
//! be scripted to fail in the ways a real SMTP relay does.
//!
//! # Testing Usage
//!
//! ```rust,ignore
//! use bulletin::providers::LocalTransport;
//! use bulletin::testing::*;
//!
//! #[tokio::test]
//! async fn notifies_every_student() {
//!     let transport = LocalTransport::new();
//!
//!     // Code under test
//!     run_dispatch(&transport).await;
//!
//!     assert_message_count(&transport, 2);
//!     assert_message_to(&transport, "asha@school.edu");
//! }
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{DispatchError, TransportErrorCode};
use crate::message::RenderedMessage;
use crate::storage::{MemoryStorage, StoredMessage};
use crate::transport::{DeliveryId, Transport};

#[derive(Debug, Clone)]
struct Failure {
    code: TransportErrorCode,
    message: String,
}

impl Failure {
    fn to_error(&self) -> DispatchError {
        DispatchError::Transport {
            code: self.code.clone(),
            message: self.message.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    /// Fails every send while set.
    always: Option<Failure>,
    /// Consumed one per send, before `always`.
    queued: VecDeque<Failure>,
    /// Fails every send to this destination.
    by_address: HashMap<String, Failure>,
    /// Extra latency before handling a send to this destination.
    latency: HashMap<String, Duration>,
}

/// Transport that stores messages in memory.
#[derive(Clone)]
pub struct LocalTransport {
    storage: Arc<MemoryStorage>,
    script: Arc<Mutex<Script>>,
    attempts: Arc<AtomicU32>,
}

impl LocalTransport {
    /// Create a new local transport with fresh storage.
    pub fn new() -> Self {
        Self::with_storage(MemoryStorage::shared())
    }

    /// Create a local transport over existing storage.
    pub fn with_storage(storage: Arc<MemoryStorage>) -> Self {
        Self {
            storage,
            script: Arc::new(Mutex::new(Script::default())),
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn storage(&self) -> Arc<MemoryStorage> {
        Arc::clone(&self.storage)
    }

    // =========================================================================
    // Failure Simulation
    // =========================================================================

    /// Fail every send with `code` until [`clear_failures`](Self::clear_failures).
    ///
    /// ```rust,ignore
    /// let transport = LocalTransport::new();
    /// transport.fail_with("connectionRefused", "connect ECONNREFUSED 127.0.0.1:587");
    /// ```
    pub fn fail_with(&self, code: impl Into<TransportErrorCode>, message: impl Into<String>) {
        self.script.lock().always = Some(Failure {
            code: code.into(),
            message: message.into(),
        });
    }

    /// Fail the next `times` sends with `code`, then behave normally.
    pub fn fail_times(
        &self,
        times: usize,
        code: impl Into<TransportErrorCode>,
        message: impl Into<String>,
    ) {
        let failure = Failure {
            code: code.into(),
            message: message.into(),
        };
        self.script
            .lock()
            .queued
            .extend(std::iter::repeat(failure).take(times));
    }

    /// Fail every send addressed to `to`.
    pub fn fail_for(
        &self,
        to: impl Into<String>,
        code: impl Into<TransportErrorCode>,
        message: impl Into<String>,
    ) {
        self.script.lock().by_address.insert(
            to.into().to_lowercase(),
            Failure {
                code: code.into(),
                message: message.into(),
            },
        );
    }

    /// Delay sends addressed to `to` by `latency`.
    pub fn delay_for(&self, to: impl Into<String>, latency: Duration) {
        self.script
            .lock()
            .latency
            .insert(to.into().to_lowercase(), latency);
    }

    /// Remove every scripted failure and delay.
    pub fn clear_failures(&self) {
        *self.script.lock() = Script::default();
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Number of `send` calls, successful or not.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Delivered messages, oldest first.
    pub fn messages(&self) -> Vec<StoredMessage> {
        self.storage.all()
    }

    pub fn last_message(&self) -> Option<StoredMessage> {
        self.storage.all().pop()
    }

    pub fn message_count(&self) -> usize {
        self.storage.count()
    }

    pub fn has_messages(&self) -> bool {
        self.storage.count() > 0
    }

    /// Remove and return all delivered messages.
    pub fn flush(&self) -> Vec<StoredMessage> {
        self.storage.flush()
    }

    /// Check if a message was delivered to `to`.
    pub fn sent_to(&self, to: &str) -> bool {
        self.storage
            .all()
            .iter()
            .any(|stored| stored.message.to_email().eq_ignore_ascii_case(to))
    }

    /// Messages delivered to `to`.
    pub fn messages_to(&self, to: &str) -> Vec<StoredMessage> {
        self.storage
            .all()
            .into_iter()
            .filter(|stored| stored.message.to_email().eq_ignore_ascii_case(to))
            .collect()
    }

    fn scripted(&self, to: &str) -> (Option<Duration>, Option<Failure>) {
        let mut script = self.script.lock();
        let latency = script.latency.get(to).copied();
        let failure = script
            .queued
            .pop_front()
            .or_else(|| script.by_address.get(to).cloned())
            .or_else(|| script.always.clone());
        (latency, failure)
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn send(&self, message: &RenderedMessage) -> Result<DeliveryId, DispatchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        message.validate()?;

        let (latency, failure) = self.scripted(&message.to_email().to_lowercase());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(failure) = failure {
            return Err(failure.to_error());
        }

        Ok(self.storage.push(message.clone()))
    }

    fn provider_name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(to: &str) -> RenderedMessage {
        RenderedMessage::new()
            .from("admin@school.edu")
            .to(to)
            .subject("Attendance")
            .body("<p>hi</p>")
    }

    #[tokio::test]
    async fn test_stores_messages() {
        let transport = LocalTransport::new();
        let id = transport.send(&message("a@s.edu")).await.unwrap();

        assert_eq!(transport.message_count(), 1);
        assert!(transport.sent_to("A@S.EDU"));
        assert_eq!(transport.storage().get(&id).unwrap().message.subject, "Attendance");
    }

    #[tokio::test]
    async fn test_rejects_invalid_message() {
        let transport = LocalTransport::new();
        let err = transport
            .send(&RenderedMessage::new().from("admin@school.edu").subject("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidMessage(_)));
        assert_eq!(transport.attempts(), 1);
        assert!(!transport.has_messages());
    }

    #[tokio::test]
    async fn test_fail_times_then_recover() {
        let transport = LocalTransport::new();
        transport.fail_times(2, "timedOut", "timeout");

        for _ in 0..2 {
            let err = transport.send(&message("a@s.edu")).await.unwrap_err();
            assert!(err.is_transient());
        }
        assert!(transport.send(&message("a@s.edu")).await.is_ok());
        assert_eq!(transport.attempts(), 3);
    }

    #[tokio::test]
    async fn test_fail_for_address() {
        let transport = LocalTransport::new();
        transport.fail_for("bad@s.edu", "rejected", "550 mailbox unavailable");

        assert!(transport.send(&message("good@s.edu")).await.is_ok());
        let err = transport.send(&message("Bad@s.edu")).await.unwrap_err();
        assert_eq!(err.transport_code(), Some(&TransportErrorCode::Rejected));
        assert_eq!(err.to_string(), "550 mailbox unavailable");
    }

    #[tokio::test]
    async fn test_fail_with_and_clear() {
        let transport = LocalTransport::new();
        transport.fail_with("connectionRefused", "refused");
        assert!(transport.send(&message("a@s.edu")).await.is_err());

        transport.clear_failures();
        assert!(transport.send(&message("a@s.edu")).await.is_ok());
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let transport = LocalTransport::new();
        let cloned = transport.clone();
        cloned.send(&message("a@s.edu")).await.unwrap();
        assert_eq!(transport.message_count(), 1);
        assert_eq!(transport.attempts(), 1);
    }
}
