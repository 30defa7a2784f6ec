//! Atomic replay protection.
//!
//! A replay record is created by the first successful validation of a key and
//! lives for `ttl` seconds. The check for staleness, the check for prior use
//! and the write happen in one store operation, so concurrent validators can
//! never both observe a key as unused. Store failures fail closed.

use std::sync::Arc;

use tracing::error;

use tokengate_core::Clock;

use crate::store::{ConsumeRequest, ConsumeStatus, SharedStore, StoreError};

/// Outcome of [`ReplayGuard::validate_and_consume`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// First use within the window; the key is now consumed.
    Ok,
    /// `expiration <= now - issued_at`.
    Stale,
    /// Already consumed.
    Used,
    /// The store could not be reached; the key cannot be proven unused.
    InfrastructureError(StoreError),
}

impl ReplayOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl From<ConsumeStatus> for ReplayOutcome {
    fn from(status: ConsumeStatus) -> Self {
        match status {
            ConsumeStatus::Consumed => Self::Ok,
            ConsumeStatus::Stale => Self::Stale,
            ConsumeStatus::Used => Self::Used,
        }
    }
}

pub struct ReplayGuard<S> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S> ReplayGuard<S>
where
    S: SharedStore,
{
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Check and consume `key` in a single store round-trip.
    ///
    /// `ttl_secs` must exceed `expiration_secs` so a replay arriving just after
    /// the window closes still finds the record.
    pub fn validate_and_consume(
        &self,
        key: &str,
        ttl_secs: u64,
        issued_at: i64,
        expiration_secs: u64,
    ) -> ReplayOutcome {
        debug_assert!(ttl_secs > expiration_secs, "replay ttl must outlive the expiration window");

        let request = ConsumeRequest {
            key,
            ttl_secs,
            issued_at,
            expiration_secs,
            now: self.clock.now_unix(),
        };

        match self.store.validate_and_consume(&request) {
            Ok(status) => status.into(),
            Err(err) => {
                error!(error = %err, "replay guard store unavailable; rejecting");
                ReplayOutcome::InfrastructureError(err)
            }
        }
    }
}

impl<S: core::fmt::Debug> core::fmt::Debug for ReplayGuard<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReplayGuard")
            .field("store", &self.store)
            .field("now", &self.clock.now_unix())
            .finish()
    }
}
