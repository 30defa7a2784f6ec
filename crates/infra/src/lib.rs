//! Infrastructure layer: shared store, rate limiting, replay protection, config.

pub mod config;
pub mod rate_limiter;
pub mod replay_guard;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::{CheckKind, ConfigError, RateLimitSettings, StoreSettings, TokenGateConfig, ValidatedConfig};
pub use rate_limiter::{RATE_LIMIT_KEY_PREFIX, RateLimiter};
pub use replay_guard::{ReplayGuard, ReplayOutcome};
pub use store::{ConsumeRequest, ConsumeStatus, InMemoryStore, SharedStore, StoreError};

#[cfg(feature = "redis")]
pub use store::RedisStore;
