//! Testing utilities and assertion helpers.
//!
//! Assertions over what a [`LocalTransport`] delivered and over the outcomes
//! of a [`DispatchReport`]. Failure messages list what was actually sent.
//!
//! # Example
//!
//! ```rust,ignore
//! use bulletin::providers::LocalTransport;
//! use bulletin::testing::*;
//!
//! #[tokio::test]
//! async fn alerts_parents() {
//!     let transport = LocalTransport::new();
//!
//!     // ... run a dispatch over the transport ...
//!
//!     assert_message_count(&transport, 2);
//!     assert_message_to(&transport, "parent@example.com");
//!     assert_body_matches(&transport, r"Attendance: \d+%");
//!     assert_outcomes_align(&report, &request);
//!     assert_failed_with(&report, "RA002", "no data found");
//! }
//! ```

use regex::Regex;

use crate::dispatch::{DispatchOutcome, DispatchReport, DispatchRequest};
use crate::providers::LocalTransport;
use crate::storage::StoredMessage;

// ============================================================================
// Helper Functions
// ============================================================================

fn format_message_summary(messages: &[StoredMessage]) -> String {
    if messages.is_empty() {
        return "  (no messages sent)".to_string();
    }

    messages
        .iter()
        .enumerate()
        .map(|(i, stored)| {
            let m = &stored.message;
            let from = m.from.as_ref().map(|a| a.email.as_str()).unwrap_or("<none>");
            format!(
                "  {}. To: {}, From: {}, Subject: \"{}\"",
                i + 1,
                m.to_email(),
                from,
                m.subject
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_outcome_summary(outcomes: &[DispatchOutcome]) -> String {
    outcomes
        .iter()
        .enumerate()
        .map(|(i, o)| {
            format!(
                "  {}. {} {} attempts={} error={:?}",
                i + 1,
                o.recipient_id,
                o.status.as_str(),
                o.attempts,
                o.error
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn last_message(transport: &LocalTransport) -> StoredMessage {
    transport
        .last_message()
        .expect("Expected at least one message to be sent, but none were sent")
}

fn outcome<'a>(report: &'a DispatchReport, recipient_id: &str) -> &'a DispatchOutcome {
    report
        .outcomes
        .iter()
        .find(|o| o.recipient_id == recipient_id)
        .unwrap_or_else(|| {
            panic!(
                "No outcome for recipient '{}'.\n\nOutcomes:\n{}",
                recipient_id,
                format_outcome_summary(&report.outcomes)
            )
        })
}

// ============================================================================
// Transport Assertions
// ============================================================================

/// Assert that at least one message was sent.
///
/// # Panics
///
/// Panics if no messages were sent.
pub fn assert_message_sent(transport: &LocalTransport) {
    assert!(
        transport.has_messages(),
        "Expected at least one message to be sent, but none were sent"
    );
}

/// Assert that no messages were sent.
///
/// # Panics
///
/// Panics if any message was sent.
pub fn assert_no_messages_sent(transport: &LocalTransport) {
    let messages = transport.messages();
    assert!(
        messages.is_empty(),
        "Expected no messages to be sent, but {} were sent.\n\nMessages sent:\n{}",
        messages.len(),
        format_message_summary(&messages)
    );
}

/// Assert that exactly N messages were sent.
pub fn assert_message_count(transport: &LocalTransport, expected: usize) {
    let actual = transport.message_count();
    assert!(
        actual == expected,
        "Expected {} message(s) to be sent, but {} were sent.\n\nMessages sent:\n{}",
        expected,
        actual,
        format_message_summary(&transport.messages())
    );
}

/// Assert that a message was sent to a specific address.
///
/// # Panics
///
/// Panics if no message was sent to the address.
pub fn assert_message_to(transport: &LocalTransport, email: &str) {
    assert!(
        transport.sent_to(email),
        "Expected a message to be sent to '{}'.\n\nMessages sent:\n{}",
        email,
        format_message_summary(&transport.messages())
    );
}

/// Assert that no message was sent to a specific address.
pub fn assert_no_message_to(transport: &LocalTransport, email: &str) {
    assert!(
        !transport.sent_to(email),
        "Expected no message to be sent to '{}'.\n\nMessages sent:\n{}",
        email,
        format_message_summary(&transport.messages())
    );
}

/// Assert the most recent message body contains text.
///
/// # Panics
///
/// Panics if no message was sent or the body doesn't contain the text.
pub fn assert_body_contains(transport: &LocalTransport, text: &str) {
    let last = last_message(transport);
    let body = &last.message.body;
    assert!(
        body.contains(text),
        "Expected body to contain '{}', but it didn't.\n\nLast message:\n{}\n\nBody (first 500 chars):\n{}",
        text,
        format_message_summary(std::slice::from_ref(&last)),
        body.chars().take(500).collect::<String>()
    );
}

/// Assert the most recent message body matches a regex pattern.
///
/// # Panics
///
/// Panics if no message was sent, the pattern is invalid, or it doesn't match.
pub fn assert_body_matches(transport: &LocalTransport, pattern: &str) {
    let last = last_message(transport);
    let re = Regex::new(pattern).expect("Invalid regex pattern");
    assert!(
        re.is_match(&last.message.body),
        "Expected body to match pattern '{}', but it didn't.\n\nLast message:\n{}\n\nBody (first 500 chars):\n{}",
        pattern,
        format_message_summary(std::slice::from_ref(&last)),
        last.message.body.chars().take(500).collect::<String>()
    );
}

// ============================================================================
// Outcome Assertions
// ============================================================================

/// Assert the report has one outcome per requested recipient, in request order.
///
/// # Panics
///
/// Panics on a length or order mismatch.
pub fn assert_outcomes_align(report: &DispatchReport, request: &DispatchRequest) {
    let actual: Vec<&str> = report
        .outcomes
        .iter()
        .map(|o| o.recipient_id.as_str())
        .collect();
    assert!(
        actual == request.recipients,
        "Expected outcomes for {:?} in order, got {:?}.\n\nOutcomes:\n{}",
        request.recipients,
        actual,
        format_outcome_summary(&report.outcomes)
    );
}

/// Assert the recipient's outcome succeeded.
pub fn assert_succeeded(report: &DispatchReport, recipient_id: &str) {
    let o = outcome(report, recipient_id);
    assert!(
        o.is_success() && o.delivery_id.is_some(),
        "Expected '{}' to succeed, but it failed: {:?}.\n\nOutcomes:\n{}",
        recipient_id,
        o.error,
        format_outcome_summary(&report.outcomes)
    );
}

/// Assert the recipient's outcome failed with an error containing `text`.
pub fn assert_failed_with(report: &DispatchReport, recipient_id: &str, text: &str) {
    let o = outcome(report, recipient_id);
    let error = o.error.as_deref().unwrap_or("");
    assert!(
        !o.is_success() && error.contains(text),
        "Expected '{}' to fail with '{}', got status {} and error {:?}.\n\nOutcomes:\n{}",
        recipient_id,
        text,
        o.status.as_str(),
        o.error,
        format_outcome_summary(&report.outcomes)
    );
}
