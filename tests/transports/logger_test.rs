//! Logger transport tests.

use bulletin::providers::LoggerTransport;
use bulletin::{DispatchError, RenderedMessage, Transport};

fn message() -> RenderedMessage {
    RenderedMessage::new()
        .from("admin@school.edu")
        .to("asha@school.edu")
        .subject("Attendance alert")
        .body("<p>Your attendance is 62%.</p>")
}

#[tokio::test]
async fn send_returns_fresh_ids() {
    let transport = LoggerTransport::new();

    let first = transport.send(&message()).await.unwrap();
    let second = transport.send(&message()).await.unwrap();

    assert!(!first.as_str().is_empty());
    assert_ne!(first, second);
}

#[tokio::test]
async fn full_logging_returns_ok() {
    let transport = LoggerTransport::full();
    let message = message().cc("hod@school.edu").bcc("records@school.edu");

    assert!(transport.send(&message).await.is_ok());
}

#[tokio::test]
async fn rejects_message_without_destination() {
    let transport = LoggerTransport::new();
    let message = RenderedMessage::new()
        .from("admin@school.edu")
        .subject("Attendance alert");

    let err = transport.send(&message).await.unwrap_err();
    assert!(matches!(err, DispatchError::InvalidMessage(_)));
    assert!(!err.is_transient());
}
