//! Shared atomic key-value store boundary.
//!
//! The store holds two disjoint keyspaces: replay records (keyed by token
//! fingerprint) and rate counters (keyed `rate_limit:<identity>`). Every
//! method is a single round-trip; no implementation may hold a connection
//! across two calls.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use in_memory::InMemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

use std::sync::Arc;

use thiserror::Error;

/// Store operation error.
///
/// All variants mean the store could not be relied on for this call. Callers
/// decide whether that fails open (rate limiting) or closed (replay checks).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Connection(String),

    #[error("store operation timed out: {0}")]
    Timeout(String),

    #[error("store connection pool unavailable: {0}")]
    Pool(String),

    #[error("store command error: {0}")]
    Command(String),

    #[error("unexpected store reply: {0}")]
    UnexpectedReply(String),
}

/// Arguments of the atomic validate-and-consume operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ConsumeRequest<'a> {
    /// Replay record key (token plaintext or message fingerprint).
    pub key: &'a str,
    /// Record lifetime; strictly greater than `expiration_secs`.
    pub ttl_secs: u64,
    /// Issue time embedded in the payload.
    pub issued_at: i64,
    /// Logical validity window.
    pub expiration_secs: u64,
    /// Caller's current unix time.
    pub now: i64,
}

impl ConsumeRequest<'_> {
    /// `expiration <= now - issued_at`. Future-dated payloads are not stale.
    pub fn is_stale(&self) -> bool {
        let age = self.now.saturating_sub(self.issued_at);
        i64::try_from(self.expiration_secs).is_ok_and(|window| window <= age)
    }
}

/// Result of a validate-and-consume call that reached the store.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConsumeStatus {
    /// Record created; the caller is the single consumer.
    Consumed,
    /// Outside the validity window; nothing was written.
    Stale,
    /// A live record already exists; nothing was written.
    Used,
}

impl ConsumeStatus {
    /// Decode the wire reply of the validate-and-consume script.
    pub fn from_reply(reply: &str) -> Result<Self, StoreError> {
        match reply {
            "ok" => Ok(Self::Consumed),
            "stale" => Ok(Self::Stale),
            "used" => Ok(Self::Used),
            other => Err(StoreError::UnexpectedReply(other.to_string())),
        }
    }
}

/// Atomic counter store shared by every validating process.
pub trait SharedStore: Send + Sync {
    /// `GET key` as an integer; `None` when absent or expired.
    fn get(&self, key: &str) -> Result<Option<i64>, StoreError>;

    /// `INCRBY key 1`, returning the post-increment value.
    fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// `INCRBY key 1` and `EXPIRE key ttl` pipelined in one round-trip.
    fn incr_with_expire(&self, key: &str, ttl_secs: u64) -> Result<i64, StoreError>;

    /// `EXPIRE key ttl`; `false` when the key does not exist.
    fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StoreError>;

    /// `DEL key`; `false` when the key did not exist.
    fn del(&self, key: &str) -> Result<bool, StoreError>;

    /// Check staleness and prior use, and mark the key consumed, as one
    /// indivisible step. Implementations must be linearizable: of N
    /// concurrent calls for the same fresh key exactly one is `Consumed`.
    fn validate_and_consume(&self, request: &ConsumeRequest<'_>) -> Result<ConsumeStatus, StoreError>;

    /// Liveness probe.
    fn ping(&self) -> Result<(), StoreError>;
}

impl<S> SharedStore for Arc<S>
where
    S: SharedStore + ?Sized,
{
    fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        (**self).get(key)
    }

    fn incr(&self, key: &str) -> Result<i64, StoreError> {
        (**self).incr(key)
    }

    fn incr_with_expire(&self, key: &str, ttl_secs: u64) -> Result<i64, StoreError> {
        (**self).incr_with_expire(key, ttl_secs)
    }

    fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        (**self).expire(key, ttl_secs)
    }

    fn del(&self, key: &str) -> Result<bool, StoreError> {
        (**self).del(key)
    }

    fn validate_and_consume(&self, request: &ConsumeRequest<'_>) -> Result<ConsumeStatus, StoreError> {
        (**self).validate_and_consume(request)
    }

    fn ping(&self) -> Result<(), StoreError> {
        (**self).ping()
    }
}
