//! SMTP transport using lettre.
//!
//! # Example
//!
//! ```rust,ignore
//! use bulletin::providers::SmtpTransport;
//!
//! // With authentication
//! let transport = SmtpTransport::new("smtp.example.com", 587)
//!     .credentials("username", "password")
//!     .build()?;
//!
//! // Without authentication (local relay)
//! let transport = SmtpTransport::localhost();
//! ```

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Attachment as LettreAttachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;

use crate::address::Address;
use crate::config::SmtpConfig;
use crate::error::{DispatchError, TransportErrorCode};
use crate::message::RenderedMessage;
use crate::transport::{DeliveryId, Transport};

/// SMTP transport.
pub struct SmtpTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    /// Create a new SMTP transport builder with STARTTLS.
    pub fn new(host: &str, port: u16) -> SmtpBuilder {
        SmtpBuilder {
            host: host.to_string(),
            port,
            credentials: None,
            tls: TlsMode::StartTls,
            timeout: None,
        }
    }

    /// Create a builder from configuration.
    ///
    /// `secure` selects implicit TLS, otherwise STARTTLS is used.
    pub fn from_config(config: &SmtpConfig) -> SmtpBuilder {
        let mut builder = Self::new(&config.host, config.port).tls(if config.secure {
            TlsMode::Tls
        } else {
            TlsMode::StartTls
        });
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(user, pass);
        }
        builder
    }

    /// Create a new SMTP transport for localhost (no TLS, no auth).
    pub fn localhost() -> Self {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous("localhost")
            .port(25)
            .build();
        Self { transport }
    }

    /// Build a lettre Message from a rendered message.
    fn build_message(&self, message: &RenderedMessage) -> Result<Message, DispatchError> {
        message.validate()?;
        let from = message
            .from
            .as_ref()
            .ok_or(DispatchError::MissingField("from"))?;
        let to = message.to.as_ref().ok_or(DispatchError::MissingField("to"))?;

        let mut builder = Message::builder()
            .from(address_to_mailbox(from)?)
            .to(address_to_mailbox(to)?)
            .subject(&message.subject);
        for cc in &message.cc {
            builder = builder.cc(address_to_mailbox(cc)?);
        }
        for bcc in &message.bcc {
            builder = builder.bcc(address_to_mailbox(bcc)?);
        }

        let html = SinglePart::builder()
            .header(ContentType::TEXT_HTML)
            .body(message.body.clone());

        if !message.has_attachments() {
            return Ok(builder.singlepart(html)?);
        }

        let mut multipart = MultiPart::mixed().singlepart(html);
        for attachment in message.attachments.iter() {
            let content_type = ContentType::parse(&attachment.content_type)
                .unwrap_or(ContentType::TEXT_PLAIN);
            multipart = multipart.singlepart(
                LettreAttachment::new(attachment.filename.clone())
                    .body(attachment.data.clone(), content_type),
            );
        }
        Ok(builder.multipart(multipart)?)
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(&self, message: &RenderedMessage) -> Result<DeliveryId, DispatchError> {
        let email = self.build_message(message)?;

        let response = self.transport.send(email).await.map_err(|e| classify(&e))?;

        // Relays usually echo a queue id in the first response line
        let id = response
            .message()
            .next()
            .and_then(|m| m.lines().next())
            .map(|s| DeliveryId::new(s.trim()))
            .unwrap_or_else(DeliveryId::generate);

        Ok(id)
    }

    fn provider_name(&self) -> &'static str {
        "smtp"
    }
}

/// Map a lettre SMTP error to a classified transport error.
fn classify(error: &lettre::transport::smtp::Error) -> DispatchError {
    let message = error.to_string();
    let code = if error.is_timeout() {
        TransportErrorCode::TimedOut
    } else if let Some(io) = io_source(error) {
        match io.kind() {
            std::io::ErrorKind::ConnectionRefused => TransportErrorCode::ConnectionRefused,
            std::io::ErrorKind::TimedOut => TransportErrorCode::TimedOut,
            _ => TransportErrorCode::Other(format!("{:?}", io.kind())),
        }
    } else if let Some(status) = error.status() {
        let status = status.to_string();
        match status.as_str() {
            "530" | "534" | "535" => TransportErrorCode::Authentication,
            _ if error.is_permanent() => TransportErrorCode::Rejected,
            _ => TransportErrorCode::Other(status),
        }
    } else if error.is_tls() || error.is_client() {
        TransportErrorCode::Protocol
    } else {
        TransportErrorCode::Other("smtp".into())
    };

    DispatchError::Transport { code, message }
}

fn io_source(error: &lettre::transport::smtp::Error) -> Option<&std::io::Error> {
    let mut source = std::error::Error::source(error);
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            return Some(io);
        }
        source = err.source();
    }
    None
}

/// TLS mode for SMTP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// No TLS (dangerous, only for localhost)
    None,
    /// STARTTLS - upgrade to TLS after connecting (port 587)
    StartTls,
    /// Implicit TLS - connect with TLS from start (port 465)
    Tls,
}

/// Builder for SmtpTransport.
pub struct SmtpBuilder {
    host: String,
    port: u16,
    credentials: Option<Credentials>,
    tls: TlsMode,
    timeout: Option<Duration>,
}

impl SmtpBuilder {
    /// Set SMTP credentials.
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some(Credentials::new(username.to_string(), password.to_string()));
        self
    }

    /// Set TLS mode.
    pub fn tls(mut self, mode: TlsMode) -> Self {
        self.tls = mode;
        self
    }

    /// Disable TLS (dangerous, only for localhost/testing).
    pub fn no_tls(mut self) -> Self {
        self.tls = TlsMode::None;
        self
    }

    /// Per-command timeout; lettre's default applies otherwise.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the transport.
    pub fn build(self) -> Result<SmtpTransport, DispatchError> {
        let builder = match self.tls {
            TlsMode::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.host),
            TlsMode::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
                .map_err(|e| DispatchError::Configuration(format!("SMTP STARTTLS relay: {e}")))?,
            TlsMode::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host)
                .map_err(|e| DispatchError::Configuration(format!("SMTP TLS relay: {e}")))?,
        };

        let mut builder = builder.port(self.port);
        if let Some(creds) = self.credentials {
            builder = builder.credentials(creds);
        }
        if self.timeout.is_some() {
            builder = builder.timeout(self.timeout);
        }

        tracing::debug!(host = %self.host, port = self.port, tls = ?self.tls, "SMTP transport built");
        Ok(SmtpTransport {
            transport: builder.build(),
        })
    }
}

/// Convert an Address to lettre's Mailbox.
fn address_to_mailbox(addr: &Address) -> Result<Mailbox, DispatchError> {
    let email = addr.to_ascii()?.parse()?;
    Ok(Mailbox::new(addr.name.clone(), email))
}
