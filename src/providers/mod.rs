//! Transport implementations.
//!
//! Each provider implements the [`Transport`](crate::Transport) trait.
//!
//! ## Available Providers
//!
//! | Provider | Feature Flag | Description |
//! |----------|-------------|-------------|
//! | [`SmtpTransport`] | `smtp` | SMTP via lettre |
//! | [`LocalTransport`] | `local` | In-memory storage with scripted failures |
//! | [`LoggerTransport`] | (none) | Logs messages without delivering |

#[cfg(feature = "smtp")]
mod smtp;
#[cfg(feature = "smtp")]
pub use smtp::{SmtpBuilder, SmtpTransport, TlsMode};

#[cfg(feature = "local")]
mod local;
#[cfg(feature = "local")]
pub use local::LocalTransport;

mod logger;
pub use logger::LoggerTransport;
