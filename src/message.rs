//! The fully-formed message handed to a transport.

use std::sync::Arc;

use crate::address::{Address, ToAddress};
use crate::attachment::{LoadedAttachment, SharedAttachments};
use crate::error::DispatchError;

/// One personalized message, ready to send.
///
/// Attachments are a shared reference to the dispatch's loaded set, so
/// building a message per recipient never copies attachment bytes.
///
/// ```
/// use bulletin::RenderedMessage;
///
/// let message = RenderedMessage::new()
///     .from("admin@school.edu")
///     .to("student@school.edu")
///     .subject("Attendance alert")
///     .body("<p>Your attendance is below 75%.</p>");
///
/// assert!(message.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct RenderedMessage {
    /// Sender address
    pub from: Option<Address>,
    /// Destination address
    pub to: Option<Address>,
    /// Carbon copy recipients
    pub cc: Vec<Address>,
    /// Blind carbon copy recipients
    pub bcc: Vec<Address>,
    /// Subject line
    pub subject: String,
    /// Rendered HTML body
    pub body: String,
    /// Attachments shared across the batch
    pub attachments: SharedAttachments,
}

impl Default for RenderedMessage {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: String::new(),
            body: String::new(),
            attachments: Arc::from(Vec::<LoadedAttachment>::new()),
        }
    }
}

impl RenderedMessage {
    /// Create an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sender address.
    pub fn from(mut self, addr: impl ToAddress) -> Self {
        self.from = Some(addr.to_address());
        self
    }

    /// Set the destination address.
    pub fn to(mut self, addr: impl ToAddress) -> Self {
        self.to = Some(addr.to_address());
        self
    }

    /// Add a CC recipient.
    pub fn cc(mut self, addr: impl ToAddress) -> Self {
        self.cc.push(addr.to_address());
        self
    }

    /// Replace all CC recipients.
    pub fn put_cc(mut self, addrs: Vec<Address>) -> Self {
        self.cc = addrs;
        self
    }

    /// Add a BCC recipient.
    pub fn bcc(mut self, addr: impl ToAddress) -> Self {
        self.bcc.push(addr.to_address());
        self
    }

    /// Replace all BCC recipients.
    pub fn put_bcc(mut self, addrs: Vec<Address>) -> Self {
        self.bcc = addrs;
        self
    }

    /// Set the subject line.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Set the HTML body.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Share an already-loaded attachment set.
    pub fn attachments(mut self, attachments: SharedAttachments) -> Self {
        self.attachments = attachments;
        self
    }

    /// Check the fields every transport requires.
    ///
    /// A message needs a sender, a non-empty destination, and a non-empty subject.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.to.as_ref().map_or(true, |a| a.email.trim().is_empty()) {
            return Err(DispatchError::InvalidMessage("recipient (to) is required".into()));
        }
        if self.subject.trim().is_empty() {
            return Err(DispatchError::InvalidMessage("subject is required".into()));
        }
        if self.from.as_ref().map_or(true, |a| a.email.trim().is_empty()) {
            return Err(DispatchError::InvalidMessage("sender (from) is required".into()));
        }
        Ok(())
    }

    /// Destination email, or an empty string.
    pub fn to_email(&self) -> &str {
        self.to.as_ref().map_or("", |a| a.email.as_str())
    }

    /// All recipients (to + cc + bcc).
    pub fn all_recipients(&self) -> Vec<&Address> {
        self.to
            .iter()
            .chain(self.cc.iter())
            .chain(self.bcc.iter())
            .collect()
    }

    /// Check if the message carries attachments.
    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RenderedMessage {
        RenderedMessage::new()
            .from("admin@school.edu")
            .to("s1@school.edu")
            .subject("Grades")
    }

    #[test]
    fn test_builder() {
        let m = valid().cc("hod@school.edu").bcc("audit@school.edu").body("<p>hi</p>");
        assert_eq!(m.to_email(), "s1@school.edu");
        assert_eq!(m.all_recipients().len(), 3);
        assert_eq!(m.body, "<p>hi</p>");
        assert!(!m.has_attachments());
    }

    #[test]
    fn test_validate_requires_to() {
        let err = RenderedMessage::new()
            .from("admin@school.edu")
            .subject("x")
            .validate()
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidMessage(m) if m.contains("to")));

        let blank_to = valid().to(Address { name: None, email: String::new() });
        assert!(blank_to.validate().is_err());
    }

    #[test]
    fn test_validate_requires_subject() {
        let err = valid().subject("  ").validate().unwrap_err();
        assert!(matches!(err, DispatchError::InvalidMessage(m) if m.contains("subject")));
    }

    #[test]
    fn test_attachments_are_shared() {
        let shared: SharedAttachments =
            Arc::from(vec![LoadedAttachment::from_bytes("a.txt", b"x".to_vec())]);
        let a = valid().attachments(Arc::clone(&shared));
        let b = valid().attachments(Arc::clone(&shared));
        assert!(Arc::ptr_eq(&a.attachments, &b.attachments));
        assert!(a.has_attachments());
    }
}
