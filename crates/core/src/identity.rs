//! Client identity resolved from a token body.

use serde::{Deserialize, Serialize};

/// Identity of a calling service, as configured on the allow-list.
///
/// Only the authorization matcher constructs these from untrusted input; the
/// wrapped string is always an exact copy of a configured allow-list entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ClientIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<ClientIdentity> for String {
    fn from(value: ClientIdentity) -> Self {
        value.0
    }
}
