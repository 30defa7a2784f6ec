//! Per-client request ceiling over the shared store.
//!
//! Counting window: the first attempt creates `rate_limit:<identity>` and sets
//! its expiry to the window length; later attempts only increment. The window
//! resets when the key expires. Store failures fail open.

use tracing::{debug, warn};

use tokengate_core::{ClientIdentity, ValidationError, ValidationResult};

use crate::config::RateLimitSettings;
use crate::store::{SharedStore, StoreError};

pub const RATE_LIMIT_KEY_PREFIX: &str = "rate_limit:";

#[derive(Debug, Clone)]
pub struct RateLimiter<S> {
    store: S,
    settings: RateLimitSettings,
}

impl<S> RateLimiter<S>
where
    S: SharedStore,
{
    pub fn new(store: S, settings: RateLimitSettings) -> Self {
        Self { store, settings }
    }

    pub fn key(identity: &ClientIdentity) -> String {
        format!("{RATE_LIMIT_KEY_PREFIX}{identity}")
    }

    /// Count one attempt and reject it if the ceiling is exceeded.
    ///
    /// Returns the attempt count in the current window. When rate limiting is
    /// disabled, or the store is unavailable, the attempt is allowed with a
    /// count of 0.
    pub fn enforce(&self, identity: &ClientIdentity) -> ValidationResult<u64> {
        if !self.settings.enabled {
            return Ok(0);
        }

        let attempts = match self.record_attempt(identity) {
            Ok(attempts) => attempts,
            Err(err) => {
                warn!(operation = "incr", error = %err, "rate limiter store unavailable; allowing request");
                return Ok(0);
            }
        };

        if attempts > self.settings.max_requests {
            debug!(stage = "rate_limit", "request rejected");
            return Err(ValidationError::RateLimitExceeded {
                client: identity.to_string(),
                attempts,
                max_requests: self.settings.max_requests,
                window_secs: self.settings.window_secs,
            });
        }

        Ok(attempts)
    }

    /// Like [`enforce`](Self::enforce), with `None` in place of the error.
    pub fn check(&self, identity: &ClientIdentity) -> Option<u64> {
        self.enforce(identity).ok()
    }

    /// Attempts recorded in the current window, without counting a new one.
    pub fn current_attempts(&self, identity: &ClientIdentity) -> u64 {
        if !self.settings.enabled {
            return 0;
        }

        match self.store.get(&Self::key(identity)) {
            Ok(count) => count.map_or(0, |c| c.max(0).unsigned_abs()),
            Err(err) => {
                warn!(operation = "get", error = %err, "rate limiter store unavailable");
                0
            }
        }
    }

    /// Forget the client's current window.
    pub fn reset(&self, identity: &ClientIdentity) {
        if let Err(err) = self.store.del(&Self::key(identity)) {
            warn!(operation = "del", error = %err, "rate limiter store unavailable; counter not reset");
        }
    }

    fn record_attempt(&self, identity: &ClientIdentity) -> Result<u64, StoreError> {
        let key = Self::key(identity);
        let count = self.store.incr(&key)?;
        // Two first attempts may both see 1; setting the same expiry twice is harmless.
        if count == 1 {
            if let Err(err) = self.store.expire(&key, self.settings.window_secs) {
                // A counter without expiry would never reset; drop it so the
                // next attempt opens a fresh window.
                if let Err(del_err) = self.store.del(&key) {
                    warn!(operation = "del", error = %del_err, "rate limiter counter left without expiry");
                }
                return Err(err);
            }
        }
        Ok(count.max(0).unsigned_abs())
    }
}
