//! # Bulletin
//!
//! Batch notification dispatch: resolve each recipient, render a personalized
//! message, send it with retry, and report one outcome per recipient.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use bulletin::prelude::*;
//!
//! let resolver = MemoryResolver::from_json_file("students.json", FieldMapping::default())?;
//! let mut renderer = HandlebarsRenderer::new();
//! renderer.load_directory("templates")?;
//!
//! let dispatcher = Dispatcher::new(
//!     Arc::new(resolver),
//!     Arc::new(renderer),
//!     Arc::new(FileAttachmentLoader::new()),
//!     transport_from_env()?,
//!     DispatchConfig::from_env()?,
//! );
//!
//! let request = DispatchRequest::new("attendance_alert", "Attendance alert")
//!     .recipients(["RA001", "RA002"])
//!     .to_parents(true);
//!
//! let report = dispatcher.dispatch(&request).await?;
//! println!("{} of {} delivered", report.succeeded().count(), report.len());
//! ```
//!
//! ## Failure Model
//!
//! - **Fatal**: invalid request, no sender, unknown template, unreadable
//!   attachment. `dispatch` returns `Err` and no outcomes.
//! - **Recipient-local**: unknown recipient, no deliverable address, send
//!   rejected or retries exhausted. Recorded as a failed outcome.
//! - **Transient**: connection refused or timed out. Retried with linear
//!   backoff before becoming recipient-local.
//!
//! ## Feature Flags
//!
//! - `smtp` - SMTP transport via lettre
//! - `local` - LocalTransport and test assertions (default)
//! - `metrics` - Prometheus-style metrics (counters/histograms)
//! - `full` - Everything above
//!
//! ## Metrics
//!
//! Enable `features = ["metrics"]` to emit Prometheus-style metrics:
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `bulletin_outcomes_total` | Counter | status | Recipient outcomes |
//! | `bulletin_send_attempts_total` | Counter | provider, result | Transport attempts |
//! | `bulletin_dispatch_duration_seconds` | Histogram | | Dispatch duration |
//! | `bulletin_batch_size` | Histogram | | Recipients per dispatch |
//!
//! Install a recorder (e.g., `metrics-exporter-prometheus`) in your app to collect them.

/// The version of the bulletin crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

mod address;
mod attachment;
mod config;
mod dispatch;
mod error;
mod message;
mod resolver;
pub mod retry;
mod template;
mod transport;

pub mod providers;

#[cfg(feature = "local")]
mod storage;

#[cfg(feature = "local")]
pub mod testing;

// Re-exports
pub use address::{Address, ToAddress};
pub use attachment::{
    AttachmentLoader, AttachmentSpec, FileAttachmentLoader, LoadedAttachment, SharedAttachments,
};
pub use config::{transport_from_env, DispatchConfig, MissingVariablePolicy, SmtpConfig};
pub use dispatch::{DispatchOutcome, DispatchReport, DispatchRequest, Dispatcher, OutcomeStatus};
pub use error::{DispatchError, TransportErrorCode};
pub use message::RenderedMessage;
pub use resolver::{ContactRecord, FieldMapping, Fields, MemoryResolver, RecipientResolver};
pub use retry::{Backoff, RetryPolicy};
pub use template::{
    extract_variables, HandlebarsRenderer, TemplateRenderer, DEFAULT_TEMPLATE_KEYS,
};
pub use transport::{DeliveryId, Transport};

#[cfg(feature = "local")]
pub use storage::{MemoryStorage, StoredMessage};

/// Prelude for convenient imports.
///
/// ```rust
/// use bulletin::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        transport_from_env, Address, AttachmentLoader, AttachmentSpec, DispatchConfig,
        DispatchError, DispatchOutcome, DispatchReport, DispatchRequest, Dispatcher, FieldMapping,
        FileAttachmentLoader, HandlebarsRenderer, MemoryResolver, MissingVariablePolicy,
        OutcomeStatus, RecipientResolver, RenderedMessage, RetryPolicy, TemplateRenderer,
        Transport,
    };

    #[cfg(feature = "local")]
    pub use crate::providers::LocalTransport;
}
