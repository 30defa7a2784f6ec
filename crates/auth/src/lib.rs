//! `tokengate-auth`: envelope cryptography and payload authorization.
//!
//! This crate is intentionally decoupled from storage: everything here is a
//! pure function of the envelope, the issuer key and the allow-list.

pub mod allow_list;
pub mod claims;
pub mod envelope;
pub mod key;
pub mod payload;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use allow_list::{AllowList, AllowListError, constant_time_eq};
pub use claims::{ClientToken, PrivateMessage, message_fingerprint};
pub use envelope::{EnvelopeDecryptor, EnvelopeError, MAX_DECODED_BYTES, MAX_ENVELOPE_CHARS, preflight};
pub use key::{IssuerKey, KeyError, MIN_KEY_BITS, OaepDigest};
pub use payload::{ParsedPayload, PayloadError, PayloadGrammar, parse};
