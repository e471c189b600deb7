//! Error types for bulletin.
//!
//! A single [`DispatchError`] covers every failure in the pipeline. Callers
//! decide what an error *means* through [`DispatchError::is_fatal`] (abort the
//! whole dispatch) and [`DispatchError::is_transient`] (retry the send).

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classified transport failure code.
///
/// Only [`ConnectionRefused`](Self::ConnectionRefused) and
/// [`TimedOut`](Self::TimedOut) are transient; everything else is permanent.
/// Serializes as its [`as_str`](Self::as_str) form for every variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum TransportErrorCode {
    /// The server refused the connection.
    ConnectionRefused,
    /// The connection or a command timed out.
    TimedOut,
    /// The server rejected the message or a recipient (5xx).
    Rejected,
    /// Credentials were refused.
    Authentication,
    /// Malformed exchange with the server.
    Protocol,
    /// Anything else, carrying the raw code.
    Other(String),
}

impl TransportErrorCode {
    /// Whether a retry may succeed without changing the message.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionRefused | Self::TimedOut)
    }

    /// Wire form of the code (`connectionRefused`, `timedOut`, ...).
    pub fn as_str(&self) -> &str {
        match self {
            Self::ConnectionRefused => "connectionRefused",
            Self::TimedOut => "timedOut",
            Self::Rejected => "rejected",
            Self::Authentication => "authentication",
            Self::Protocol => "protocol",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for TransportErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for TransportErrorCode {
    fn from(code: &str) -> Self {
        match code {
            "connectionRefused" | "ECONNREFUSED" => Self::ConnectionRefused,
            "timedOut" | "ETIMEDOUT" => Self::TimedOut,
            "rejected" => Self::Rejected,
            "authentication" => Self::Authentication,
            "protocol" => Self::Protocol,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for TransportErrorCode {
    fn from(code: String) -> Self {
        Self::from(code.as_str())
    }
}

impl From<TransportErrorCode> for String {
    fn from(code: TransportErrorCode) -> Self {
        code.as_str().to_string()
    }
}

/// Errors that can occur while dispatching a batch.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// Configuration error (missing env var, invalid value, etc.)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Neither the request nor the configuration supplied a sender.
    #[error("sender email required: set DEFAULT_SENDER_EMAIL or provide `from` in the request")]
    SenderRequired,

    /// Missing required request field.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Invalid email address format.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// No template is stored under this name.
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    /// Template failed to compile or render.
    #[error("Template error: {0}")]
    Template(String),

    /// Required variables had no value and the policy is strict.
    #[error("missing template variables for {template}: {}", .missing.join(", "))]
    MissingVariables {
        template: String,
        missing: Vec<String>,
    },

    /// Failed to read an attachment source.
    #[error("Failed to read attachment {filename}: {reason}")]
    AttachmentReadError { filename: String, reason: String },

    /// The resolver has no record for this identifier.
    #[error("no data found for {0}")]
    RecipientNotFound(String),

    /// The selected address on the contact record is empty.
    #[error("no deliverable address")]
    NoDeliverableAddress(String),

    /// Message rejected before reaching the transport.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Network or protocol failure reported by the transport.
    #[error("{message}")]
    Transport {
        code: TransportErrorCode,
        message: String,
    },

    /// Recipient did not finish before the dispatch deadline.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),
}

impl DispatchError {
    /// Create a transport error.
    pub fn transport(code: impl Into<TransportErrorCode>, message: impl Into<String>) -> Self {
        Self::Transport {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create an attachment read error for `filename`.
    pub fn attachment(filename: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::AttachmentReadError {
            filename: filename.into(),
            reason: reason.to_string(),
        }
    }

    /// Transport code, if this is a transport error.
    pub fn transport_code(&self) -> Option<&TransportErrorCode> {
        match self {
            Self::Transport { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Whether retrying the same send may succeed.
    pub fn is_transient(&self) -> bool {
        self.transport_code()
            .is_some_and(TransportErrorCode::is_transient)
    }

    /// Whether this error aborts the whole dispatch rather than one recipient.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::SenderRequired
                | Self::MissingField(_)
                | Self::TemplateNotFound(_)
                | Self::AttachmentReadError { .. }
        )
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<handlebars::TemplateError> for DispatchError {
    fn from(err: handlebars::TemplateError) -> Self {
        Self::Template(err.to_string())
    }
}

impl From<handlebars::RenderError> for DispatchError {
    fn from(err: handlebars::RenderError) -> Self {
        Self::Template(err.to_string())
    }
}

#[cfg(feature = "smtp")]
impl From<lettre::error::Error> for DispatchError {
    fn from(err: lettre::error::Error) -> Self {
        Self::InvalidMessage(err.to_string())
    }
}

#[cfg(feature = "smtp")]
impl From<lettre::address::AddressError> for DispatchError {
    fn from(err: lettre::address::AddressError) -> Self {
        Self::InvalidAddress(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_codes() {
        assert!(TransportErrorCode::ConnectionRefused.is_transient());
        assert!(TransportErrorCode::TimedOut.is_transient());
        assert!(!TransportErrorCode::Rejected.is_transient());
        assert!(!TransportErrorCode::Authentication.is_transient());
        assert!(!TransportErrorCode::Other("EAUTH".into()).is_transient());
    }

    #[test]
    fn test_code_from_str() {
        assert_eq!(
            TransportErrorCode::from("ECONNREFUSED"),
            TransportErrorCode::ConnectionRefused
        );
        assert_eq!(TransportErrorCode::from("timedOut"), TransportErrorCode::TimedOut);
        assert_eq!(
            TransportErrorCode::from("EENVELOPE"),
            TransportErrorCode::Other("EENVELOPE".into())
        );
    }

    #[test]
    fn test_code_serializes_as_plain_string() {
        let codes = vec![
            TransportErrorCode::ConnectionRefused,
            TransportErrorCode::Rejected,
            TransportErrorCode::Other("EENVELOPE".into()),
        ];
        let json = serde_json::to_value(&codes).unwrap();
        assert_eq!(json, serde_json::json!(["connectionRefused", "rejected", "EENVELOPE"]));

        let back: Vec<TransportErrorCode> = serde_json::from_value(json).unwrap();
        assert_eq!(back, codes);
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            DispatchError::RecipientNotFound("R2".into()).to_string(),
            "no data found for R2"
        );
        assert_eq!(
            DispatchError::NoDeliverableAddress("R1".into()).to_string(),
            "no deliverable address"
        );
        assert!(DispatchError::SenderRequired
            .to_string()
            .contains("sender email required"));
        assert_eq!(
            DispatchError::transport("connectionRefused", "connect ECONNREFUSED").to_string(),
            "connect ECONNREFUSED"
        );
    }

    #[test]
    fn test_classification() {
        assert!(DispatchError::transport("timedOut", "t").is_transient());
        assert!(!DispatchError::transport("rejected", "r").is_transient());
        assert!(!DispatchError::RecipientNotFound("x".into()).is_transient());

        assert!(DispatchError::SenderRequired.is_fatal());
        assert!(DispatchError::TemplateNotFound("t".into()).is_fatal());
        assert!(DispatchError::attachment("a.pdf", "gone").is_fatal());
        assert!(!DispatchError::RecipientNotFound("x".into()).is_fatal());
        assert!(!DispatchError::transport("rejected", "r").is_fatal());
    }

    #[test]
    fn test_missing_variables_display() {
        let err = DispatchError::MissingVariables {
            template: "welcome".into(),
            missing: vec!["name".into(), "department".into()],
        };
        assert_eq!(
            err.to_string(),
            "missing template variables for welcome: name, department"
        );
    }
}
