//! Local transport tests.

use std::time::Duration;

use bulletin::providers::LocalTransport;
use bulletin::retry::send_with_retry;
use bulletin::{DispatchError, MemoryStorage, RenderedMessage, RetryPolicy, Transport, TransportErrorCode};

fn message(to: &str) -> RenderedMessage {
    RenderedMessage::new()
        .from("admin@school.edu")
        .to(to)
        .subject("Grades posted")
        .body("<p>Semester grades are available.</p>")
}

// ============================================================================
// Delivery
// ============================================================================

#[tokio::test]
async fn send_stores_message() {
    let transport = LocalTransport::new();

    let id = transport.send(&message("asha@school.edu")).await.unwrap();

    assert_eq!(transport.message_count(), 1);
    let stored = transport.last_message().unwrap();
    assert_eq!(stored.id, id);
    assert_eq!(stored.message.to_email(), "asha@school.edu");
}

#[tokio::test]
async fn messages_are_kept_in_delivery_order() {
    let transport = LocalTransport::new();
    for to in ["a@school.edu", "b@school.edu", "c@school.edu"] {
        transport.send(&message(to)).await.unwrap();
    }

    let order: Vec<String> = transport
        .messages()
        .iter()
        .map(|m| m.message.to_email().to_string())
        .collect();
    assert_eq!(order, ["a@school.edu", "b@school.edu", "c@school.edu"]);
    assert_eq!(transport.messages_to("b@school.edu").len(), 1);
}

#[tokio::test]
async fn flush_empties_storage() {
    let transport = LocalTransport::new();
    transport.send(&message("a@school.edu")).await.unwrap();

    assert_eq!(transport.flush().len(), 1);
    assert!(!transport.has_messages());
}

#[tokio::test]
async fn shared_storage_sees_deliveries() {
    let storage = MemoryStorage::shared();
    let transport = LocalTransport::with_storage(storage.clone());

    transport.send(&message("a@school.edu")).await.unwrap();

    assert_eq!(storage.count(), 1);
}

// ============================================================================
// Scripted Failures
// ============================================================================

#[tokio::test]
async fn scripted_codes_are_classified() {
    let transport = LocalTransport::new();

    for (code, transient) in [
        ("connectionRefused", true),
        ("ECONNREFUSED", true),
        ("timedOut", true),
        ("ETIMEDOUT", true),
        ("rejected", false),
        ("authentication", false),
        ("EAUTH", false),
    ] {
        transport.fail_with(code, "boom");
        let err = transport.send(&message("a@school.edu")).await.unwrap_err();
        assert_eq!(err.is_transient(), transient, "{code}");
    }

    let err = transport.send(&message("a@school.edu")).await.unwrap_err();
    assert_eq!(
        err.transport_code(),
        Some(&TransportErrorCode::Other("EAUTH".into()))
    );
}

#[tokio::test]
async fn queued_failures_run_before_address_failures() {
    let transport = LocalTransport::new();
    transport.fail_for("a@school.edu", "rejected", "550 no such user");
    transport.fail_times(1, "timedOut", "timeout");

    let first = transport.send(&message("a@school.edu")).await.unwrap_err();
    let second = transport.send(&message("a@school.edu")).await.unwrap_err();

    assert_eq!(first.transport_code(), Some(&TransportErrorCode::TimedOut));
    assert_eq!(second.transport_code(), Some(&TransportErrorCode::Rejected));
    assert!(transport.send(&message("b@school.edu")).await.is_ok());
}

#[tokio::test]
async fn invalid_message_is_counted_but_not_stored() {
    let transport = LocalTransport::new();
    let err = transport
        .send(&RenderedMessage::new().from("admin@school.edu").to("a@school.edu"))
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::InvalidMessage(_)));
    assert_eq!(transport.attempts(), 1);
    assert_eq!(transport.message_count(), 0);
}

// ============================================================================
// Retry Over The Transport
// ============================================================================

#[tokio::test(start_paused = true)]
async fn send_with_retry_recovers_from_transient_failures() {
    let transport = LocalTransport::new();
    transport.fail_times(1, "connectionRefused", "refused");
    let policy = RetryPolicy::new(3, Duration::from_millis(50));

    let start = tokio::time::Instant::now();
    let attempted = send_with_retry(&transport, &message("a@school.edu"), &policy).await;

    assert!(attempted.result.is_ok());
    assert_eq!(attempted.attempts, 2);
    assert_eq!(start.elapsed(), Duration::from_millis(50));
}

#[tokio::test(start_paused = true)]
async fn send_with_retry_stops_on_invalid_message() {
    let transport = LocalTransport::new();
    let policy = RetryPolicy::default();

    let attempted =
        send_with_retry(&transport, &RenderedMessage::new().to("a@school.edu"), &policy).await;

    assert!(matches!(attempted.result, Err(DispatchError::InvalidMessage(_))));
    assert_eq!(attempted.attempts, 1);
}
