//! Client names.

use std::fmt;

use crate::{DomainError, DomainResult};

/// Name a client binds to its connection during the handshake.
///
/// Names are opaque and case-sensitive. The relay never enforces
/// uniqueness or validates the handshake line: whatever the peer sends
/// (minus the line terminator) becomes its name. Use [`ClientName::addressable`]
/// when a name has to survive a round trip through a `target:body` frame.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ClientName(String);

impl ClientName {
    /// Creates a name without validation.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Creates a name that can be used as the target of a data frame.
    ///
    /// # Errors
    ///
    /// - `DomainError::Empty` for an empty name
    /// - `DomainError::Separator` if the name contains `:`
    /// - `DomainError::LineBreak` if the name contains `\n` or `\r`
    pub fn addressable(name: impl Into<String>) -> DomainResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(DomainError::Empty { field: "name" });
        }
        if name.contains(['\n', '\r']) {
            return Err(DomainError::LineBreak {
                field: "name",
                value: name,
            });
        }
        if name.contains(':') {
            return Err(DomainError::Separator {
                field: "name",
                value: name,
            });
        }
        Ok(Self(name))
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the name, returning the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ClientName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ClientName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ClientName {
    fn from(name: String) -> Self {
        Self(name)
    }
}
