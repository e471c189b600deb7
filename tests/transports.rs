//! Transport integration tests.

#[cfg(feature = "local")]
#[path = "transports/local_test.rs"]
mod local_test;
#[path = "transports/logger_test.rs"]
mod logger_test;
#[cfg(feature = "smtp")]
#[path = "transports/smtp_test.rs"]
mod smtp_test;
