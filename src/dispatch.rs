//! The dispatch pipeline.
//!
//! A [`Dispatcher`] takes one [`DispatchRequest`] and, for each recipient in
//! order, resolves contact data, renders the template, and sends the result
//! with retry. Every recipient yields exactly one [`DispatchOutcome`]; a
//! recipient's failure never stops the batch.
//!
//! Whole-batch problems (invalid request, no sender, unknown template,
//! unreadable attachment) are detected before any recipient is touched and
//! returned as `Err`, with no partial outcomes.
//!
//! ```rust,ignore
//! use bulletin::{DispatchConfig, DispatchRequest, Dispatcher};
//!
//! let dispatcher = Dispatcher::new(resolver, renderer, loader, transport, DispatchConfig::from_env()?);
//!
//! let request = DispatchRequest::new("attendance_alert", "Attendance below 75%")
//!     .recipients(["RA001", "RA002"])
//!     .to_parents(true);
//!
//! let report = dispatcher.dispatch(&request).await?;
//! for outcome in &report.outcomes {
//!     println!("{}: {:?}", outcome.recipient_id, outcome.status);
//! }
//! ```

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::Instrument;

use crate::address::Address;
use crate::attachment::{AttachmentLoader, AttachmentSpec, SharedAttachments};
use crate::config::{DispatchConfig, MissingVariablePolicy};
use crate::error::DispatchError;
use crate::message::RenderedMessage;
use crate::resolver::{ContactRecord, RecipientResolver};
use crate::retry::{send_with_retry, Attempted};
use crate::template::TemplateRenderer;
use crate::transport::{DeliveryId, Transport};

// ============================================================================
// Request
// ============================================================================

/// One batch of personalized messages to send.
///
/// Serializes with the wire names used by the HTTP layer:
///
/// ```json
/// {
///   "recipients": ["RA001", "RA002"],
///   "templateName": "attendance_alert",
///   "subject": "Attendance alert",
///   "cc": ["hod@school.edu"],
///   "from": "admin@school.edu",
///   "toParents": true,
///   "attachments": [{"filename": "policy.pdf", "path": "docs/policy.pdf"}]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    /// Recipient identifiers, in outcome order
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub template_name: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<String>,
    /// Sender; the configured default is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Deliver to each recipient's alternate (parent) address
    #[serde(default)]
    pub to_parents: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentSpec>,
}

impl DispatchRequest {
    pub fn new(template_name: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            template_name: template_name.into(),
            subject: subject.into(),
            ..Default::default()
        }
    }

    /// Parse a request from its JSON wire form.
    pub fn from_json(json: &str) -> Result<Self, DispatchError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn recipient(mut self, id: impl Into<String>) -> Self {
        self.recipients.push(id.into());
        self
    }

    pub fn recipients<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recipients.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn cc(mut self, email: impl Into<String>) -> Self {
        self.cc.push(email.into());
        self
    }

    pub fn bcc(mut self, email: impl Into<String>) -> Self {
        self.bcc.push(email.into());
        self
    }

    pub fn from(mut self, email: impl Into<String>) -> Self {
        self.from = Some(email.into());
        self
    }

    pub fn to_parents(mut self, to_parents: bool) -> Self {
        self.to_parents = to_parents;
        self
    }

    pub fn attachment(mut self, spec: AttachmentSpec) -> Self {
        self.attachments.push(spec);
        self
    }

    /// Check the fields every request must carry.
    ///
    /// Whitespace-only values count as missing.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.recipients.is_empty() {
            return Err(DispatchError::MissingField("recipients"));
        }
        if self.subject.trim().is_empty() {
            return Err(DispatchError::MissingField("subject"));
        }
        if self.template_name.trim().is_empty() {
            return Err(DispatchError::MissingField("templateName"));
        }
        Ok(())
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Final state of one recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Failed,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// Result for one recipient of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub recipient_id: String,
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<DeliveryId>,
    /// Error text for failed recipients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Transport attempts made; 0 when nothing was sent
    #[serde(default)]
    pub attempts: u32,
    /// Template variables that had no value for this recipient
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<String>,
}

impl DispatchOutcome {
    pub fn succeeded(recipient_id: impl Into<String>, delivery_id: DeliveryId, attempts: u32) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            status: OutcomeStatus::Success,
            delivery_id: Some(delivery_id),
            error: None,
            attempts,
            missing_fields: Vec::new(),
        }
    }

    pub fn failed(recipient_id: impl Into<String>, error: &DispatchError, attempts: u32) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            status: OutcomeStatus::Failed,
            delivery_id: None,
            error: Some(error.to_string()),
            attempts,
            missing_fields: Vec::new(),
        }
    }

    fn with_missing(mut self, missing: Vec<String>) -> Self {
        self.missing_fields = missing;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Everything one call to [`Dispatcher::dispatch`] produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub dispatch_id: String,
    /// One outcome per requested recipient, in request order
    pub outcomes: Vec<DispatchOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DispatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &DispatchOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &DispatchOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn is_complete_success(&self) -> bool {
        self.outcomes.iter().all(DispatchOutcome::is_success)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Per-dispatch state shared read-only by every recipient.
struct Batch<'a> {
    request: &'a DispatchRequest,
    sender: Address,
    cc: Vec<Address>,
    bcc: Vec<Address>,
    required: BTreeSet<String>,
    attachments: SharedAttachments,
}

/// Runs dispatch requests against a fixed set of collaborators.
pub struct Dispatcher {
    resolver: Arc<dyn RecipientResolver>,
    renderer: Arc<dyn TemplateRenderer>,
    loader: Arc<dyn AttachmentLoader>,
    transport: Arc<dyn Transport>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        resolver: Arc<dyn RecipientResolver>,
        renderer: Arc<dyn TemplateRenderer>,
        loader: Arc<dyn AttachmentLoader>,
        transport: Arc<dyn Transport>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            resolver,
            renderer,
            loader,
            transport,
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Parse a JSON request and dispatch it.
    pub async fn dispatch_json(&self, json: &str) -> Result<DispatchReport, DispatchError> {
        let request = DispatchRequest::from_json(json)?;
        self.dispatch(&request).await
    }

    /// Dispatch one batch.
    ///
    /// Returns `Err` only for whole-batch failures, which are all detected
    /// before the first recipient is processed. Otherwise the report holds
    /// one outcome per recipient, in request order.
    pub async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchReport, DispatchError> {
        let dispatch_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!(
            "bulletin.dispatch",
            dispatch_id = %dispatch_id,
            template = %request.template_name,
            recipients = request.recipients.len(),
        );

        async move {
            let started_at = Utc::now();
            #[cfg(feature = "metrics")]
            let timer = std::time::Instant::now();

            let result = self.run(request).await;

            #[cfg(feature = "metrics")]
            {
                metrics::histogram!("bulletin_dispatch_duration_seconds")
                    .record(timer.elapsed().as_secs_f64());
                metrics::histogram!("bulletin_batch_size").record(request.recipients.len() as f64);
            }

            let outcomes = match result {
                Ok(outcomes) => outcomes,
                Err(err) => {
                    tracing::error!(error = %err, "Dispatch aborted");
                    return Err(err);
                }
            };

            let report = DispatchReport {
                dispatch_id,
                outcomes,
                started_at,
                finished_at: Utc::now(),
            };
            tracing::info!(
                succeeded = report.succeeded().count(),
                failed = report.failed().count(),
                "Dispatch finished"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    async fn run(&self, request: &DispatchRequest) -> Result<Vec<DispatchOutcome>, DispatchError> {
        let batch = self.prepare(request).await?;
        let batch = &batch;
        let deadline = self
            .config
            .deadline
            .map(|d| tokio::time::Instant::now() + d);

        let mut indexed: Vec<(usize, DispatchOutcome)> = stream::iter(request.recipients.iter().enumerate())
            .map(|(index, recipient_id)| async move {
                let span = tracing::debug_span!("bulletin.recipient", recipient_id = %recipient_id);
                let work = self.process(batch, recipient_id).instrument(span);
                let outcome = match deadline {
                    Some(at) => match tokio::time::timeout_at(at, work).await {
                        Ok(result) => result?,
                        Err(_) => {
                            tracing::warn!(recipient_id = %recipient_id, "Deadline exceeded");
                            DispatchOutcome::failed(recipient_id, &DispatchError::DeadlineExceeded, 0)
                        }
                    },
                    None => work.await?,
                };
                Ok::<_, DispatchError>((index, outcome))
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .try_collect()
            .await?;

        // Completion order is arbitrary under concurrency
        indexed.sort_by_key(|(index, _)| *index);
        Ok(indexed.into_iter().map(|(_, outcome)| outcome).collect())
    }

    /// Whole-batch checks and shared setup, in order: request fields,
    /// sender and copy addresses, template, attachments.
    async fn prepare<'a>(&self, request: &'a DispatchRequest) -> Result<Batch<'a>, DispatchError> {
        request.validate()?;

        let sender = match request.from.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
            Some(from) => Address::parse(from)?,
            None => self
                .config
                .default_sender
                .clone()
                .ok_or(DispatchError::SenderRequired)?,
        };

        let cc = address_set(&request.cc)?;
        let bcc = address_set(&request.bcc)?;

        let required = self.renderer.required_variables(&request.template_name)?;

        let attachments: SharedAttachments = if request.attachments.is_empty() {
            Arc::from(Vec::new())
        } else {
            let loaded = self.loader.load(&request.attachments).await?;
            tracing::debug!(count = loaded.len(), "Attachments loaded");
            Arc::from(loaded)
        };

        Ok(Batch {
            request,
            sender,
            cc,
            bcc,
            required,
            attachments,
        })
    }

    /// Carry one recipient from resolution to a terminal outcome.
    ///
    /// `Err` is reserved for whole-batch failures.
    async fn process(&self, batch: &Batch<'_>, recipient_id: &str) -> Result<DispatchOutcome, DispatchError> {
        let template = &batch.request.template_name;

        let record = match self.resolver.resolve(recipient_id).await {
            Ok(record) => record,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => return Ok(self.failed(recipient_id, err, 0)),
        };

        let (variables, missing) = bind_variables(&record, &batch.required);
        if !missing.is_empty() {
            match self.config.missing_variables {
                MissingVariablePolicy::Strict => {
                    let err = DispatchError::MissingVariables {
                        template: template.clone(),
                        missing: missing.clone(),
                    };
                    return Ok(self.failed(recipient_id, err, 0).with_missing(missing));
                }
                MissingVariablePolicy::Substitute => {
                    tracing::warn!(missing = ?missing, "Template variables missing, rendering empty");
                }
            }
        }

        let body = match self.renderer.render(template, &variables) {
            Ok(body) => body,
            Err(err @ DispatchError::TemplateNotFound(_)) => return Err(err),
            Err(err) => return Ok(self.failed(recipient_id, err, 0).with_missing(missing)),
        };

        let destination = record.address(batch.request.to_parents);
        if destination.is_empty() {
            let err = DispatchError::NoDeliverableAddress(recipient_id.to_string());
            return Ok(self.failed(recipient_id, err, 0).with_missing(missing));
        }
        let to = match Address::parse(destination) {
            Ok(to) => to,
            Err(err) => return Ok(self.failed(recipient_id, err, 0).with_missing(missing)),
        };

        let message = RenderedMessage::new()
            .from(&batch.sender)
            .to(to)
            .put_cc(batch.cc.clone())
            .put_bcc(batch.bcc.clone())
            .subject(&batch.request.subject)
            .body(body)
            .attachments(Arc::clone(&batch.attachments));

        let Attempted { result, attempts } =
            send_with_retry(&*self.transport, &message, &self.config.retry).await;

        let outcome = match result {
            Ok(delivery_id) => {
                tracing::debug!(delivery_id = %delivery_id, attempts, "Delivered");
                record_outcome(OutcomeStatus::Success);
                DispatchOutcome::succeeded(recipient_id, delivery_id, attempts)
            }
            Err(err) => self.failed(recipient_id, err, attempts),
        };
        Ok(outcome.with_missing(missing))
    }

    fn failed(&self, recipient_id: &str, err: DispatchError, attempts: u32) -> DispatchOutcome {
        tracing::warn!(recipient_id, error = %err, attempts, "Recipient failed");
        record_outcome(OutcomeStatus::Failed);
        DispatchOutcome::failed(recipient_id, &err, attempts)
    }
}

#[cfg(feature = "metrics")]
fn record_outcome(status: OutcomeStatus) {
    metrics::counter!("bulletin_outcomes_total", "status" => status.as_str()).increment(1);
}

#[cfg(not(feature = "metrics"))]
fn record_outcome(_status: OutcomeStatus) {}

/// Build the render variables for a record.
///
/// Starts from every record field, then gives each required key a value.
/// Required keys that are absent or blank are returned as missing.
fn bind_variables(
    record: &ContactRecord,
    required: &BTreeSet<String>,
) -> (BTreeMap<String, String>, Vec<String>) {
    let mut variables = record.fields.clone();
    let mut missing = Vec::new();
    for key in required {
        if record.field(key).map_or(true, |v| v.trim().is_empty()) {
            missing.push(key.clone());
            variables.insert(key.clone(), String::new());
        }
    }
    (variables, missing)
}

/// Trimmed, non-blank addresses with case-insensitive duplicates removed.
///
/// Any malformed entry fails with [`DispatchError::InvalidAddress`].
fn address_set(emails: &[String]) -> Result<Vec<Address>, DispatchError> {
    let mut seen = HashSet::new();
    emails
        .iter()
        .map(|e| e.trim())
        .filter(|e| !e.is_empty() && seen.insert(e.to_lowercase()))
        .map(Address::parse)
        .collect()
}
