use sha2::{Digest, Sha256};

use tokengate_core::ClientIdentity;

/// A client token that passed every configured check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientToken {
    client_name: String,
    identity: Option<ClientIdentity>,
    issued_at: i64,
}

impl ClientToken {
    pub fn new(client_name: impl Into<String>, identity: Option<ClientIdentity>, issued_at: i64) -> Self {
        Self {
            client_name: client_name.into(),
            identity,
            issued_at,
        }
    }

    /// The token body, trimmed.
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// The allow-listed identity, when client authorization ran.
    pub fn identity(&self) -> Option<&ClientIdentity> {
        self.identity.as_ref()
    }

    /// Unix timestamp embedded by the issuer.
    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }
}

/// A private message that passed decryption, parsing and replay protection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateMessage {
    body: String,
    issued_at: i64,
}

impl PrivateMessage {
    pub fn new(body: impl Into<String>, issued_at: i64) -> Self {
        Self {
            body: body.into(),
            issued_at,
        }
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }
}

/// Fixed-width replay key for a decrypted message: lowercase hex SHA-256.
pub fn message_fingerprint(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}
