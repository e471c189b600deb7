//! Dispatch and transport configuration.
//!
//! Configuration is always passed explicitly into [`Dispatcher::new`](crate::Dispatcher::new).
//! The `from_env` constructors are conveniences for process bootstrapping;
//! nothing in the pipeline reads the environment on its own.
//!
//! ## Environment Variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `DEFAULT_SENDER_EMAIL` | Sender used when a request omits `from` (fallback: `EMAIL_FROM`) |
//! | `DEFAULT_SENDER_NAME` | Display name for the default sender |
//! | `DISPATCH_MAX_ATTEMPTS` | Transport attempts per message (default: 3) |
//! | `DISPATCH_RETRY_BASE_DELAY_MS` | Base backoff delay in milliseconds (default: 2000) |
//! | `DISPATCH_CONCURRENCY` | Recipients processed at once (default: 1) |
//! | `DISPATCH_MISSING_VARIABLES` | `substitute` or `strict` |
//! | `DISPATCH_DEADLINE_MS` | Overall deadline for one dispatch (optional) |
//! | `DISPATCH_TRANSPORT` | `smtp`, `local`, `logger`, `logger_full` |
//! | `SMTP_HOST` | SMTP server host |
//! | `SMTP_PORT` | SMTP server port (default: 587) |
//! | `SMTP_SECURE` | `true` for implicit TLS |
//! | `SMTP_USER` | SMTP username (fallback: `SMTP_USERNAME`) |
//! | `SMTP_PASS` | SMTP password (fallback: `SMTP_PASSWORD`) |

use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::DispatchError;
use crate::providers;
use crate::retry::RetryPolicy;
use crate::transport::Transport;

/// What to do when a template variable has no value for a recipient.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingVariablePolicy {
    /// Render the slot empty and report the field on the outcome.
    #[default]
    Substitute,
    /// Fail the recipient without sending.
    Strict,
}

impl FromStr for MissingVariablePolicy {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "substitute" => Ok(Self::Substitute),
            "strict" => Ok(Self::Strict),
            other => Err(DispatchError::Configuration(format!(
                "Unknown missing-variable policy: {other}. Valid values are: substitute, strict"
            ))),
        }
    }
}

/// Settings for one [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Sender used when a request has no `from`.
    pub default_sender: Option<Address>,
    pub retry: RetryPolicy,
    /// Recipients in flight at once; 1 processes them in input order.
    pub concurrency: usize,
    pub missing_variables: MissingVariablePolicy,
    /// Overall deadline for one dispatch, measured from its start.
    pub deadline: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_sender: None,
            retry: RetryPolicy::default(),
            concurrency: 1,
            missing_variables: MissingVariablePolicy::default(),
            deadline: None,
        }
    }
}

impl DispatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_sender(mut self, sender: impl Into<Address>) -> Self {
        self.default_sender = Some(sender.into());
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Values below 1 are treated as 1.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn missing_variables(mut self, policy: MissingVariablePolicy) -> Self {
        self.missing_variables = policy;
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Build configuration from environment variables.
    ///
    /// Unset variables keep their defaults; malformed values are a
    /// [`DispatchError::Configuration`].
    pub fn from_env() -> Result<Self, DispatchError> {
        let mut config = Self::default();

        config.default_sender = default_sender_from_env()?;

        let mut retry = RetryPolicy::default();
        if let Some(attempts) = parse_var::<u32>("DISPATCH_MAX_ATTEMPTS")? {
            if attempts == 0 {
                return Err(DispatchError::Configuration(
                    "DISPATCH_MAX_ATTEMPTS must be at least 1".into(),
                ));
            }
            retry.max_attempts = attempts;
        }
        if let Some(ms) = parse_var::<u64>("DISPATCH_RETRY_BASE_DELAY_MS")? {
            retry.base_delay = Duration::from_millis(ms);
        }
        config.retry = retry;

        if let Some(concurrency) = parse_var::<usize>("DISPATCH_CONCURRENCY")? {
            config = config.concurrency(concurrency);
        }
        if let Some(policy) = parse_var::<MissingVariablePolicy>("DISPATCH_MISSING_VARIABLES")? {
            config.missing_variables = policy;
        }
        if let Some(ms) = parse_var::<u64>("DISPATCH_DEADLINE_MS")? {
            config.deadline = Some(Duration::from_millis(ms));
        }

        tracing::debug!(
            default_sender = ?config.default_sender.as_ref().map(|a| a.email.as_str()),
            max_attempts = config.retry.max_attempts,
            concurrency = config.concurrency,
            "Dispatch configuration loaded from environment"
        );
        Ok(config)
    }
}

fn default_sender_from_env() -> Result<Option<Address>, DispatchError> {
    let Some(email) = non_empty_var("DEFAULT_SENDER_EMAIL").or_else(|| non_empty_var("EMAIL_FROM"))
    else {
        return Ok(None);
    };
    let name = non_empty_var("DEFAULT_SENDER_NAME").unwrap_or_default();
    Address::parse_with_name(&name, &email)
        .map(Some)
        .map_err(|e| DispatchError::Configuration(format!("DEFAULT_SENDER_EMAIL: {e}")))
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(key: &str) -> Result<Option<T>, DispatchError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty_var(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| DispatchError::Configuration(format!("{key}={raw}: {e}"))),
    }
}

/// Connection settings for an SMTP relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// Implicit TLS when true, STARTTLS otherwise.
    pub secure: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl SmtpConfig {
    pub fn from_env() -> Result<Self, DispatchError> {
        let host = non_empty_var("SMTP_HOST")
            .ok_or_else(|| DispatchError::Configuration("SMTP_HOST not set".into()))?;
        let port = parse_var::<u16>("SMTP_PORT")?.unwrap_or(587);
        let secure = match non_empty_var("SMTP_SECURE") {
            None => false,
            Some(v) => matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"),
        };
        Ok(Self {
            host,
            port,
            secure,
            username: non_empty_var("SMTP_USER").or_else(|| non_empty_var("SMTP_USERNAME")),
            password: non_empty_var("SMTP_PASS").or_else(|| non_empty_var("SMTP_PASSWORD")),
        })
    }
}

/// Auto-detect a transport from enabled features and available settings.
fn detect_transport() -> Option<&'static str> {
    #[cfg(feature = "smtp")]
    if env::var("SMTP_HOST").is_ok() {
        return Some("smtp");
    }
    #[cfg(feature = "local")]
    {
        return Some("local");
    }
    #[allow(unreachable_code)]
    None
}

/// Create a transport from environment variables.
///
/// `DISPATCH_TRANSPORT` picks the transport; when unset, `smtp` is chosen if
/// `SMTP_HOST` is set, else `local` if that feature is enabled.
pub fn transport_from_env() -> Result<Arc<dyn Transport>, DispatchError> {
    let name = match non_empty_var("DISPATCH_TRANSPORT") {
        Some(name) => name.to_lowercase(),
        None => match detect_transport() {
            Some(name) => {
                tracing::debug!(transport = name, "Auto-detected transport");
                name.to_string()
            }
            None => {
                return Err(DispatchError::Configuration(
                    "DISPATCH_TRANSPORT not set and could not auto-detect. \
                    Set DISPATCH_TRANSPORT or SMTP_HOST."
                        .into(),
                ))
            }
        },
    };

    match name.as_str() {
        #[cfg(feature = "smtp")]
        "smtp" => {
            let config = SmtpConfig::from_env()?;
            Ok(Arc::new(providers::SmtpTransport::from_config(&config).build()?))
        }
        #[cfg(not(feature = "smtp"))]
        "smtp" => Err(DispatchError::Configuration(
            "DISPATCH_TRANSPORT=smtp but 'smtp' feature is not enabled. \
            Add `features = [\"smtp\"]` to Cargo.toml"
                .into(),
        )),

        #[cfg(feature = "local")]
        "local" => Ok(Arc::new(providers::LocalTransport::new())),
        #[cfg(not(feature = "local"))]
        "local" => Err(DispatchError::Configuration(
            "DISPATCH_TRANSPORT=local but 'local' feature is not enabled. \
            Add `features = [\"local\"]` to Cargo.toml"
                .into(),
        )),

        "logger" => Ok(Arc::new(providers::LoggerTransport::new())),
        "logger_full" => Ok(Arc::new(providers::LoggerTransport::full())),

        _ => Err(DispatchError::Configuration(format!(
            "Unknown DISPATCH_TRANSPORT: {name}. Valid transports are: smtp, local, logger, logger_full"
        ))),
    }
}
