//! Test doubles for the shared store and a log-capture helper.

use std::io;
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;

use crate::store::{ConsumeRequest, ConsumeStatus, SharedStore, StoreError};

/// A store that is always down. Every call fails with a connection error.
#[derive(Debug, Default, Copy, Clone)]
pub struct UnavailableStore;

impl UnavailableStore {
    fn down<T>() -> Result<T, StoreError> {
        Err(StoreError::Connection("connection refused".to_string()))
    }
}

impl SharedStore for UnavailableStore {
    fn get(&self, _key: &str) -> Result<Option<i64>, StoreError> {
        Self::down()
    }

    fn incr(&self, _key: &str) -> Result<i64, StoreError> {
        Self::down()
    }

    fn incr_with_expire(&self, _key: &str, _ttl_secs: u64) -> Result<i64, StoreError> {
        Self::down()
    }

    fn expire(&self, _key: &str, _ttl_secs: u64) -> Result<bool, StoreError> {
        Self::down()
    }

    fn del(&self, _key: &str) -> Result<bool, StoreError> {
        Self::down()
    }

    fn validate_and_consume(&self, _request: &ConsumeRequest<'_>) -> Result<ConsumeStatus, StoreError> {
        Self::down()
    }

    fn ping(&self) -> Result<(), StoreError> {
        Self::down()
    }
}

/// Formatted log output captured by [`capture_logs`].
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    pub fn contents(&self) -> String {
        self.buf
            .lock()
            .map(|buf| String::from_utf8_lossy(&buf).into_owned())
            .unwrap_or_default()
    }

    /// True when some captured line at `level` contains `needle`.
    pub fn contains(&self, level: tracing::Level, needle: &str) -> bool {
        let level = level.to_string();
        self.contents()
            .lines()
            .any(|line| line.contains(&level) && line.contains(needle))
    }
}

pub struct CapturedWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for CapturedWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self
            .buf
            .lock()
            .map_err(|_| io::Error::other("log buffer poisoned"))?;
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CapturedWriter {
            buf: self.buf.clone(),
        }
    }
}

/// Run `f` with a thread-local subscriber that records every event.
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, CapturedLogs) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .finish();

    let result = tracing::subscriber::with_default(subscriber, f);
    (result, logs)
}
