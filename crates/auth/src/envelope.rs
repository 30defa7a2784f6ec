//! Envelope decryption with input hardening.
//!
//! Every gate runs before the next one and short-circuits. Encoding and size
//! are checked before the private key is touched, so oversized or malformed
//! input never reaches the (comparatively expensive) RSA operation.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

use crate::key::{IssuerKey, OaepDigest};

/// Maximum accepted envelope length, in characters.
pub const MAX_ENVELOPE_CHARS: usize = 2048;

/// Maximum accepted ciphertext length after Base64 decoding, in bytes.
pub const MAX_DECODED_BYTES: usize = 1024;

/// Rejection of an envelope.
///
/// Cryptographic failures of any kind (bad padding, wrong key, corrupted
/// ciphertext, non-UTF-8 plaintext) all collapse to [`EnvelopeError::Undecryptable`].
#[derive(Debug, Error, Copy, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("envelope must be a string")]
    NotText,

    #[error("envelope cannot be empty")]
    Empty,

    #[error("envelope too long")]
    TooLong,

    #[error("invalid envelope encoding")]
    Malformed,

    #[error("envelope too large")]
    TooLarge,

    #[error("invalid envelope")]
    Undecryptable,
}

/// Pre-flight hardening applied to raw caller input.
///
/// Rejects non-text, empty and over-long input without any cryptographic work.
pub fn preflight(raw: &[u8]) -> Result<&str, EnvelopeError> {
    let text = core::str::from_utf8(raw).map_err(|_| EnvelopeError::NotText)?;
    if text.is_empty() {
        return Err(EnvelopeError::Empty);
    }
    // Base64 is ASCII, but count characters so multi-byte input is judged fairly.
    if text.len() > MAX_ENVELOPE_CHARS && text.chars().count() > MAX_ENVELOPE_CHARS {
        return Err(EnvelopeError::TooLong);
    }
    Ok(text)
}

/// Standard alphabet, optional `=` padding (at most two), no whitespace.
fn is_strict_base64(text: &str) -> bool {
    let body = text.trim_end_matches('=');
    text.len() - body.len() <= 2
        && body
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
}

/// Decrypts envelopes with a single, shared issuer key.
#[derive(Debug, Clone)]
pub struct EnvelopeDecryptor {
    key: IssuerKey,
    digest: OaepDigest,
}

impl EnvelopeDecryptor {
    pub fn new(key: IssuerKey, digest: OaepDigest) -> Self {
        Self { key, digest }
    }

    /// Decode and decrypt an envelope into its UTF-8 plaintext.
    pub fn decrypt(&self, envelope: &str) -> Result<String, EnvelopeError> {
        preflight(envelope.as_bytes())?;

        if !is_strict_base64(envelope) {
            return Err(EnvelopeError::Malformed);
        }
        let ciphertext = STANDARD
            .decode(envelope)
            .map_err(|_| EnvelopeError::Malformed)?;

        if ciphertext.len() > MAX_DECODED_BYTES {
            return Err(EnvelopeError::TooLarge);
        }

        let plaintext = self
            .key
            .rsa()
            .decrypt_blinded(&mut rand::thread_rng(), self.digest.padding(), &ciphertext)
            .map_err(|_| EnvelopeError::Undecryptable)?;

        String::from_utf8(plaintext).map_err(|_| EnvelopeError::Undecryptable)
    }
}
