//! Email address type with optional display name.

use crate::error::DispatchError;
use email_address::EmailAddress;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An email address with an optional display name.
///
/// # Examples
///
/// ```
/// use bulletin::Address;
///
/// let addr: Address = "registrar@school.edu".into();
/// assert_eq!(addr.email, "registrar@school.edu");
/// assert_eq!(addr.name, None);
///
/// let addr: Address = ("Registrar", "registrar@school.edu").into();
/// assert_eq!(addr.formatted(), "Registrar <registrar@school.edu>");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    /// Optional display name
    pub name: Option<String>,
    /// Email address
    pub email: String,
}

impl Address {
    /// Create an address without validation.
    ///
    /// Logs a warning if the address does not even contain `@`.
    /// Use [`Address::parse`] where bad input must be rejected.
    pub fn new(email: impl Into<String>) -> Self {
        let email = email.into();
        if !Self::basic_sanity_check(&email) {
            tracing::warn!(email = %email, "Creating address with potentially invalid email");
        }
        Self { name: None, email }
    }

    /// Create an address with a display name, without validation.
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            name: (!name.is_empty()).then_some(name),
            ..Self::new(email)
        }
    }

    fn basic_sanity_check(email: &str) -> bool {
        !email.is_empty() && email.contains('@')
    }

    /// Parse and validate an address (RFC 5321/5322 via `email_address`).
    ///
    /// Surrounding whitespace is trimmed.
    ///
    /// ```
    /// use bulletin::Address;
    ///
    /// assert!(Address::parse(" parent@example.com ").is_ok());
    /// assert!(Address::parse("not-an-email").is_err());
    /// ```
    pub fn parse(email: &str) -> Result<Self, DispatchError> {
        let email = email.trim();
        if !EmailAddress::is_valid(email) {
            return Err(DispatchError::InvalidAddress(format!(
                "'{}' is not a valid email address",
                email
            )));
        }
        Ok(Self {
            name: None,
            email: email.to_string(),
        })
    }

    /// Parse and validate an address with a display name.
    ///
    /// An empty name is dropped.
    pub fn parse_with_name(name: &str, email: &str) -> Result<Self, DispatchError> {
        let mut addr = Self::parse(email)?;
        if !name.is_empty() {
            addr.name = Some(name.to_string());
        }
        Ok(addr)
    }

    /// The address with its domain converted to ASCII (Punycode).
    pub fn to_ascii(&self) -> Result<String, DispatchError> {
        let (local, domain) = self.email.split_once('@').ok_or_else(|| {
            DispatchError::InvalidAddress(format!("'{}' is missing @ symbol", self.email))
        })?;
        let domain = idna::domain_to_ascii(domain).map_err(|e| {
            DispatchError::InvalidAddress(format!(
                "Failed to convert domain '{}' to ASCII: {:?}",
                domain, e
            ))
        })?;
        Ok(format!("{}@{}", local, domain))
    }

    /// Format as "Name <email>" or just "email" if no name.
    pub fn formatted(&self) -> String {
        match &self.name {
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }

    /// Format for a message header, quoting the name and using an ASCII domain.
    pub fn formatted_header(&self) -> Result<String, DispatchError> {
        let email = self.to_ascii()?;
        Ok(match &self.name {
            Some(name) => {
                let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{}\" <{}>", escaped, email)
            }
            None => email,
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}

impl From<&str> for Address {
    fn from(email: &str) -> Self {
        Self::new(email)
    }
}

impl From<String> for Address {
    fn from(email: String) -> Self {
        Self::new(email)
    }
}

impl<N: Into<String>, E: Into<String>> From<(N, E)> for Address {
    fn from((name, email): (N, E)) -> Self {
        Self::with_name(name, email)
    }
}

/// Types that can be turned into an [`Address`] by message builders.
pub trait ToAddress {
    fn to_address(&self) -> Address;
}

impl<T: ToAddress + ?Sized> ToAddress for &T {
    fn to_address(&self) -> Address {
        (*self).to_address()
    }
}

impl ToAddress for Address {
    fn to_address(&self) -> Address {
        self.clone()
    }
}

impl ToAddress for str {
    fn to_address(&self) -> Address {
        Address::new(self)
    }
}

impl ToAddress for String {
    fn to_address(&self) -> Address {
        Address::new(self)
    }
}

impl<N: AsRef<str>, E: AsRef<str>> ToAddress for (N, E) {
    fn to_address(&self) -> Address {
        Address::with_name(self.0.as_ref(), self.1.as_ref())
    }
}
