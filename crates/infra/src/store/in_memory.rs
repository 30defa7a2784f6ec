use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokengate_core::{Clock, SystemClock};

use super::{ConsumeRequest, ConsumeStatus, SharedStore, StoreError};

#[derive(Debug, Copy, Clone)]
struct Entry {
    value: i64,
    /// Unix second at which the key disappears; `None` means no expiry.
    expires_at: Option<i64>,
}

impl Entry {
    fn is_live(&self, now: i64) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// In-memory shared store.
///
/// Intended for tests/dev and single-process deployments. One mutex guards
/// the whole map, which makes `validate_and_consume` trivially linearizable.
/// Expiry follows the injected clock, so tests can move time explicitly.
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Command("lock poisoned".to_string()))
    }

    /// Live entry for `key`, dropping it first if it has expired.
    fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str, now: i64) -> Option<&'a mut Entry> {
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }

    fn incr_locked(entries: &mut HashMap<String, Entry>, key: &str, now: i64) -> i64 {
        match Self::live(entries, key, now) {
            Some(entry) => {
                entry.value += 1;
                entry.value
            }
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: 1,
                        expires_at: None,
                    },
                );
                1
            }
        }
    }

    /// Remaining lifetime of `key` in seconds, like `TTL`: `None` when the key
    /// is absent, `Some(-1)` when it never expires.
    pub fn ttl(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let now = self.clock.now_unix();
        let mut entries = self.lock()?;
        Ok(Self::live(&mut entries, key, now).map(|e| e.expires_at.map_or(-1, |at| at - now)))
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now_unix();
        self.entries
            .lock()
            .map(|entries| entries.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("live_keys", &self.len())
            .finish_non_exhaustive()
    }
}

impl SharedStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let now = self.clock.now_unix();
        let mut entries = self.lock()?;
        Ok(Self::live(&mut entries, key, now).map(|e| e.value))
    }

    fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let now = self.clock.now_unix();
        let mut entries = self.lock()?;
        Ok(Self::incr_locked(&mut entries, key, now))
    }

    fn incr_with_expire(&self, key: &str, ttl_secs: u64) -> Result<i64, StoreError> {
        let now = self.clock.now_unix();
        let mut entries = self.lock()?;
        let value = Self::incr_locked(&mut entries, key, now);
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(now.saturating_add_unsigned(ttl_secs));
        }
        Ok(value)
    }

    fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        let now = self.clock.now_unix();
        let mut entries = self.lock()?;
        Ok(match Self::live(&mut entries, key, now) {
            Some(entry) => {
                entry.expires_at = Some(now.saturating_add_unsigned(ttl_secs));
                true
            }
            None => false,
        })
    }

    fn del(&self, key: &str) -> Result<bool, StoreError> {
        let now = self.clock.now_unix();
        let mut entries = self.lock()?;
        let existed = Self::live(&mut entries, key, now).is_some();
        entries.remove(key);
        Ok(existed)
    }

    fn validate_and_consume(&self, request: &ConsumeRequest<'_>) -> Result<ConsumeStatus, StoreError> {
        if request.is_stale() {
            return Ok(ConsumeStatus::Stale);
        }

        let now = self.clock.now_unix();
        let mut entries = self.lock()?;

        if Self::live(&mut entries, request.key, now).is_some_and(|e| e.value > 0) {
            return Ok(ConsumeStatus::Used);
        }

        Self::incr_locked(&mut entries, request.key, now);
        if let Some(entry) = entries.get_mut(request.key) {
            entry.expires_at = Some(now.saturating_add_unsigned(request.ttl_secs));
        }
        Ok(ConsumeStatus::Consumed)
    }

    fn ping(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}
