//! Issuer-side helpers for tests.
//!
//! Token issuance is outside this system; these helpers exist only so tests
//! can produce envelopes the way a real issuer would.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rsa::RsaPublicKey;

use crate::key::{IssuerKey, OaepDigest};

/// 2048-bit issuer key, PKCS#8 encoding.
pub const ISSUER_KEY_PKCS8_PEM: &str = include_str!("../tests/fixtures/issuer_2048_pkcs8.pem");

/// Same key as [`ISSUER_KEY_PKCS8_PEM`], PKCS#1 encoding.
pub const ISSUER_KEY_PKCS1_PEM: &str = include_str!("../tests/fixtures/issuer_2048_pkcs1.pem");

/// 1024-bit key, below the accepted minimum.
pub const WEAK_KEY_PEM: &str = include_str!("../tests/fixtures/weak_1024_pkcs8.pem");

/// `svcA_1700000000` sealed by the OpenSSL CLI (OAEP, SHA-1) for [`ISSUER_KEY_PKCS8_PEM`].
pub const OPENSSL_SHA1_ENVELOPE: &str = include_str!("../tests/fixtures/openssl_oaep_sha1_svcA.b64");

/// `svcA_1700000000` sealed by the OpenSSL CLI (OAEP, SHA-256/MGF1-SHA-256).
pub const OPENSSL_SHA256_ENVELOPE: &str =
    include_str!("../tests/fixtures/openssl_oaep_sha256_svcA.b64");

pub fn issuer_key() -> IssuerKey {
    IssuerKey::from_pem(ISSUER_KEY_PKCS8_PEM).expect("fixture key must parse")
}

/// Encrypts plaintexts for a given issuer key, producing Base64 envelopes.
#[derive(Debug, Clone)]
pub struct EnvelopeSealer {
    public: RsaPublicKey,
    digest: OaepDigest,
}

impl EnvelopeSealer {
    pub fn new(key: &IssuerKey, digest: OaepDigest) -> Self {
        Self {
            public: RsaPublicKey::from(key.rsa()),
            digest,
        }
    }

    pub fn seal(&self, plaintext: &str) -> String {
        let ciphertext = self.seal_raw(plaintext.as_bytes());
        STANDARD.encode(ciphertext)
    }

    pub fn seal_raw(&self, plaintext: &[u8]) -> Vec<u8> {
        self.public
            .encrypt(&mut rand::thread_rng(), self.digest.padding(), plaintext)
            .expect("plaintext must fit in one OAEP block")
    }
}
