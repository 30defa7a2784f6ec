//! Validation pipelines.
//!
//! Stages run in a fixed order and the first failure stops the pipeline:
//! pre-flight, decryption, parsing, then (tokens) the configured checks or
//! (messages) replay protection on the content fingerprint.

use tracing::{debug, instrument};

use tokengate_auth::{
    ClientToken, EnvelopeDecryptor, EnvelopeError, PayloadGrammar, PrivateMessage, message_fingerprint, parse,
    preflight,
};
use tokengate_core::{ValidationError, ValidationResult};
use tokengate_infra::{CheckKind, ReplayGuard, SharedStore};

use crate::checks::{TokenCheck, replay_result};
use crate::context::TokenCandidate;

pub const INVALID_TOKEN_FORMAT: &str = "Invalid token format";
pub const MALFORMED_MESSAGE_FORMAT: &str = "Malformed message format";

fn token_envelope_error(err: EnvelopeError) -> ValidationError {
    ValidationError::invalid_token(match err {
        EnvelopeError::NotText => "Token must be a string",
        EnvelopeError::Empty => "Token cannot be empty",
        EnvelopeError::TooLong => "Token too long",
        EnvelopeError::Malformed => INVALID_TOKEN_FORMAT,
        EnvelopeError::TooLarge => "Token too large",
        EnvelopeError::Undecryptable => "Invalid token",
    })
}

fn message_envelope_error(err: EnvelopeError) -> ValidationError {
    ValidationError::invalid_message(match err {
        EnvelopeError::NotText => "Message must be a string",
        EnvelopeError::Empty => "Message cannot be empty",
        EnvelopeError::TooLong => "Message too long",
        EnvelopeError::Malformed => "Invalid message format",
        EnvelopeError::TooLarge => "Message too large",
        EnvelopeError::Undecryptable => "Invalid message",
    })
}

/// Client-token pipeline.
pub struct TokenValidator {
    decryptor: EnvelopeDecryptor,
    checks: Vec<Box<dyn TokenCheck>>,
}

impl TokenValidator {
    pub fn new(decryptor: EnvelopeDecryptor, checks: Vec<Box<dyn TokenCheck>>) -> Self {
        Self { decryptor, checks }
    }

    /// Configured checks, in run order.
    pub fn check_kinds(&self) -> Vec<CheckKind> {
        self.checks.iter().map(|c| c.kind()).collect()
    }

    /// Run every stage; return the first failure.
    #[instrument(skip_all)]
    pub fn validate(&self, envelope: impl AsRef<[u8]>) -> ValidationResult<ClientToken> {
        let result = self.run(envelope.as_ref());
        if let Err(err) = &result {
            debug!(reason = err.kind(), "token rejected");
        }
        result
    }

    /// Same stages and side effects as [`validate`](Self::validate); only
    /// reports whether the token was accepted.
    pub fn is_valid(&self, envelope: impl AsRef<[u8]>) -> bool {
        self.validate(envelope).is_ok()
    }

    fn run(&self, raw: &[u8]) -> ValidationResult<ClientToken> {
        let envelope = preflight(raw).map_err(token_envelope_error)?;
        let plaintext = self.decryptor.decrypt(envelope).map_err(token_envelope_error)?;

        let payload = parse(&plaintext, PayloadGrammar::Token)
            .map_err(|_| ValidationError::invalid_token(INVALID_TOKEN_FORMAT))?;

        let mut candidate = TokenCandidate::new(&plaintext, payload);
        for check in &self.checks {
            check.run(&mut candidate)?;
        }

        Ok(candidate.into_token())
    }
}

impl core::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("decryptor", &self.decryptor)
            .field("checks", &self.check_kinds())
            .finish()
    }
}

/// Private-message pipeline. Always replay-protected; keyed by the SHA-256
/// fingerprint of the decrypted message.
#[derive(Debug)]
pub struct MessageValidator<S> {
    decryptor: EnvelopeDecryptor,
    guard: ReplayGuard<S>,
    expiration_secs: u64,
    ttl_secs: u64,
}

impl<S> MessageValidator<S>
where
    S: SharedStore,
{
    pub fn new(decryptor: EnvelopeDecryptor, guard: ReplayGuard<S>, expiration_secs: u64, ttl_secs: u64) -> Self {
        Self {
            decryptor,
            guard,
            expiration_secs,
            ttl_secs,
        }
    }

    #[instrument(skip_all)]
    pub fn validate(&self, envelope: impl AsRef<[u8]>) -> ValidationResult<PrivateMessage> {
        let result = self.run(envelope.as_ref());
        if let Err(err) = &result {
            debug!(reason = err.kind(), "message rejected");
        }
        result
    }

    pub fn is_valid(&self, envelope: impl AsRef<[u8]>) -> bool {
        self.validate(envelope).is_ok()
    }

    fn run(&self, raw: &[u8]) -> ValidationResult<PrivateMessage> {
        let envelope = preflight(raw).map_err(message_envelope_error)?;
        let plaintext = self.decryptor.decrypt(envelope).map_err(message_envelope_error)?;

        let payload = parse(&plaintext, PayloadGrammar::Message)
            .map_err(|_| ValidationError::invalid_message(MALFORMED_MESSAGE_FORMAT))?;

        let outcome = self.guard.validate_and_consume(
            &message_fingerprint(&plaintext),
            self.ttl_secs,
            payload.issued_at,
            self.expiration_secs,
        );
        replay_result(outcome, ValidationError::StaleMessage, ValidationError::UsedMessage)?;

        Ok(PrivateMessage::new(payload.body, payload.issued_at))
    }
}
