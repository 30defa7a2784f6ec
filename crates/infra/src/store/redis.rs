//! Redis-backed shared store.
//!
//! Connections come from an `r2d2` pool. Each connection is opened with the
//! configured connect timeout and carries read/write timeouts, so every
//! operation is bounded independently of the caller's own deadline. A
//! connection is checked out for exactly one command, pipeline or script and
//! returned on drop, including on error.
//!
//! The tests that run the consume script against a live server are ignored by
//! default. Run them with:
//!
//! ```text
//! TOKENGATE_TEST_REDIS_URL=redis://127.0.0.1:6379/ \
//!     cargo test -p tokengate-infra --features redis -- --ignored
//! ```

use std::time::Duration;

use ::redis::{Client, Connection, ConnectionLike, IntoConnectionInfo, RedisError, Script};
use tracing::{instrument, warn};

use super::{ConsumeRequest, ConsumeStatus, SharedStore, StoreError};
use crate::config::StoreSettings;

/// Server-side validate-and-consume. Runs atomically on the Redis server.
///
/// KEYS[1] = record key
/// ARGV    = ttl, issued_at, expiration, now
const VALIDATE_AND_CONSUME_LUA: &str = r#"
local key = KEYS[1]
local ttl = tonumber(ARGV[1])
local issued_at = tonumber(ARGV[2])
local expiration = tonumber(ARGV[3])
local now = tonumber(ARGV[4])

if expiration <= (now - issued_at) then
  return 'stale'
end

local current = redis.call('GET', key)
if current and tonumber(current) > 0 then
  return 'used'
end

redis.call('INCRBY', key, 1)
redis.call('EXPIRE', key, ttl)
return 'ok'
"#;

/// r2d2 manager applying connect and per-operation timeouts.
#[derive(Debug)]
struct RedisConnectionManager {
    client: Client,
    connect_timeout: Duration,
    operation_timeout: Duration,
}

impl r2d2::ManageConnection for RedisConnectionManager {
    type Connection = Connection;
    type Error = RedisError;

    fn connect(&self) -> Result<Connection, RedisError> {
        let conn = self.client.get_connection_with_timeout(self.connect_timeout)?;
        conn.set_read_timeout(Some(self.operation_timeout))?;
        conn.set_write_timeout(Some(self.operation_timeout))?;
        Ok(conn)
    }

    fn is_valid(&self, conn: &mut Connection) -> Result<(), RedisError> {
        ::redis::cmd("PING").query::<String>(conn).map(|_| ())
    }

    fn has_broken(&self, conn: &mut Connection) -> bool {
        !conn.is_open()
    }
}

/// Routes pool-level connection failures into tracing.
#[derive(Debug, Copy, Clone)]
struct TracingErrorHandler;

impl r2d2::HandleError<RedisError> for TracingErrorHandler {
    fn handle_error(&self, error: RedisError) {
        warn!(error = %error, "redis pool failed to open a connection");
    }
}

fn map_redis_error(op: &'static str, err: RedisError) -> StoreError {
    if err.is_timeout() {
        StoreError::Timeout(format!("{op}: {err}"))
    } else if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
        StoreError::Connection(format!("{op}: {err}"))
    } else {
        StoreError::Command(format!("{op}: {err}"))
    }
}

/// Redis-backed [`SharedStore`].
pub struct RedisStore {
    pool: r2d2::Pool<RedisConnectionManager>,
    consume_script: Script,
}

impl RedisStore {
    /// Build the client and pool. Connections are opened lazily, so an
    /// unreachable server is reported by the first operation (see
    /// [`SharedStore::ping`]), not here.
    pub fn connect(settings: &StoreSettings) -> Result<Self, StoreError> {
        let mut info = settings
            .url
            .as_str()
            .into_connection_info()
            .map_err(|e| StoreError::Connection(format!("invalid store url: {e}")))?;
        if let Some(password) = settings.password.as_deref().filter(|p| !p.is_empty()) {
            info.redis.password = Some(password.to_string());
        }

        let client = Client::open(info).map_err(|e| map_redis_error("open", e))?;

        let manager = RedisConnectionManager {
            client,
            connect_timeout: settings.connect_timeout(),
            operation_timeout: settings.operation_timeout(),
        };

        let pool = r2d2::Pool::builder()
            .max_size(settings.pool_size)
            .min_idle(Some(0))
            .connection_timeout(settings.checkout_timeout())
            .test_on_check_out(false)
            .error_handler(Box::new(TracingErrorHandler))
            .build_unchecked(manager);

        Ok(Self {
            pool,
            consume_script: Script::new(VALIDATE_AND_CONSUME_LUA),
        })
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<RedisConnectionManager>, StoreError> {
        self.pool.get().map_err(|e| StoreError::Pool(e.to_string()))
    }
}

impl core::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.pool.state();
        f.debug_struct("RedisStore")
            .field("connections", &state.connections)
            .field("idle_connections", &state.idle_connections)
            .finish_non_exhaustive()
    }
}

impl SharedStore for RedisStore {
    fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn()?;
        ::redis::cmd("GET")
            .arg(key)
            .query(&mut *conn)
            .map_err(|e| map_redis_error("GET", e))
    }

    fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn()?;
        ::redis::cmd("INCRBY")
            .arg(key)
            .arg(1)
            .query(&mut *conn)
            .map_err(|e| map_redis_error("INCRBY", e))
    }

    fn incr_with_expire(&self, key: &str, ttl_secs: u64) -> Result<i64, StoreError> {
        let mut conn = self.conn()?;
        let (value,): (i64,) = ::redis::pipe()
            .cmd("INCRBY")
            .arg(key)
            .arg(1)
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl_secs)
            .ignore()
            .query(&mut *conn)
            .map_err(|e| map_redis_error("INCRBY+EXPIRE", e))?;
        Ok(value)
    }

    fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        ::redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl_secs)
            .query(&mut *conn)
            .map_err(|e| map_redis_error("EXPIRE", e))
    }

    fn del(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let removed: i64 = ::redis::cmd("DEL")
            .arg(key)
            .query(&mut *conn)
            .map_err(|e| map_redis_error("DEL", e))?;
        Ok(removed > 0)
    }

    #[instrument(skip_all, err)]
    fn validate_and_consume(&self, request: &ConsumeRequest<'_>) -> Result<ConsumeStatus, StoreError> {
        let mut conn = self.conn()?;
        let reply: String = self
            .consume_script
            .key(request.key)
            .arg(request.ttl_secs)
            .arg(request.issued_at)
            .arg(request.expiration_secs)
            .arg(request.now)
            .invoke(&mut *conn)
            .map_err(|e| map_redis_error("EVALSHA validate_and_consume", e))?;
        ConsumeStatus::from_reply(&reply)
    }

    fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let pong: String = ::redis::cmd("PING")
            .query(&mut *conn)
            .map_err(|e| map_redis_error("PING", e))?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(StoreError::UnexpectedReply(pong))
        }
    }
}
