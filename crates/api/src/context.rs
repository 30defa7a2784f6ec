use tokengate_auth::{ClientToken, ParsedPayload};
use tokengate_core::ClientIdentity;

/// A decrypted, parsed token moving through the configured checks.
///
/// Borrowed from the plaintext for the duration of one validation call; it is
/// never stored.
#[derive(Debug)]
pub struct TokenCandidate<'a> {
    plaintext: &'a str,
    body: &'a str,
    issued_at: i64,
    identity: Option<ClientIdentity>,
    attempts: Option<u64>,
}

impl<'a> TokenCandidate<'a> {
    pub fn new(plaintext: &'a str, payload: ParsedPayload<'a>) -> Self {
        Self {
            plaintext,
            body: payload.body,
            issued_at: payload.issued_at,
            identity: None,
            attempts: None,
        }
    }

    /// The full decrypted token; doubles as its replay key.
    pub fn plaintext(&self) -> &'a str {
        self.plaintext
    }

    /// The client-name part of the payload, untrimmed.
    pub fn body(&self) -> &'a str {
        self.body
    }

    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }

    /// Set once client authorization has matched the allow-list.
    pub fn identity(&self) -> Option<&ClientIdentity> {
        self.identity.as_ref()
    }

    pub fn authorize(&mut self, identity: ClientIdentity) {
        self.identity = Some(identity);
    }

    /// Attempts counted by the rate limiter in the current window.
    pub fn attempts(&self) -> Option<u64> {
        self.attempts
    }

    pub fn record_attempts(&mut self, attempts: u64) {
        self.attempts = Some(attempts);
    }

    pub fn into_token(self) -> ClientToken {
        ClientToken::new(self.body.trim(), self.identity, self.issued_at)
    }
}
