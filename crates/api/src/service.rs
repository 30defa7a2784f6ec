//! The `TokenGate` service: the four public entry points over one validated
//! configuration, one decryptor and one shared-store handle.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use tokengate_auth::{ClientToken, EnvelopeDecryptor, PrivateMessage};
use tokengate_core::{Clock, SystemClock, ValidationResult};
use tokengate_infra::{RateLimiter, RedisStore, ReplayGuard, SharedStore, StoreError, ValidatedConfig};

use crate::checks::build_checks;
use crate::pipeline::{MessageValidator, TokenValidator};

/// Store handle shared by every stage.
pub type DynStore = Arc<dyn SharedStore>;

pub struct TokenGate {
    config: ValidatedConfig,
    store: DynStore,
    tokens: TokenValidator,
    messages: MessageValidator<DynStore>,
    rate_limiter: RateLimiter<DynStore>,
}

impl TokenGate {
    /// Assemble the pipelines. The key and the store handle are built once
    /// here and shared read-only by every call.
    pub fn new(config: ValidatedConfig, store: DynStore, clock: Arc<dyn Clock>) -> Self {
        let decryptor = EnvelopeDecryptor::new(config.key().clone(), config.oaep_digest());

        let tokens = TokenValidator::new(decryptor.clone(), build_checks(&config, store.clone(), clock.clone()));
        let messages = MessageValidator::new(
            decryptor,
            ReplayGuard::new(store.clone(), clock),
            config.token_expiration_secs(),
            config.replay_ttl_secs(),
        );
        let rate_limiter = RateLimiter::new(store.clone(), config.rate_limit());

        info!(
            clients = config.allow_list().len(),
            checks = ?tokens.check_kinds(),
            expiration_secs = config.token_expiration_secs(),
            "token gate ready"
        );

        Self {
            config,
            store,
            tokens,
            messages,
            rate_limiter,
        }
    }

    /// Connect to the configured Redis store with the wall clock.
    pub fn connect(config: ValidatedConfig) -> Result<Self, StoreError> {
        let store = RedisStore::connect(config.store())?;
        Ok(Self::new(config, Arc::new(store), Arc::new(SystemClock)))
    }

    pub fn config(&self) -> &ValidatedConfig {
        &self.config
    }

    pub fn rate_limiter(&self) -> &RateLimiter<DynStore> {
        &self.rate_limiter
    }

    pub fn validate_token(&self, envelope: impl AsRef<[u8]>) -> ValidationResult<ClientToken> {
        self.tokens.validate(envelope)
    }

    pub fn token_valid(&self, envelope: impl AsRef<[u8]>) -> bool {
        self.tokens.is_valid(envelope)
    }

    pub fn validate_message(&self, envelope: impl AsRef<[u8]>) -> ValidationResult<PrivateMessage> {
        self.messages.validate(envelope)
    }

    pub fn message_valid(&self, envelope: impl AsRef<[u8]>) -> bool {
        self.messages.is_valid(envelope)
    }

    /// `PING` the shared store.
    #[instrument(skip_all)]
    pub fn health_check(&self) -> bool {
        match self.store.ping() {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "shared store health check failed");
                false
            }
        }
    }

    /// Release the store handle. Pooled connections close once the last
    /// clone of the handle is dropped.
    pub fn shutdown(self) {
        info!("token gate shut down");
    }
}

impl core::fmt::Debug for TokenGate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenGate")
            .field("config", &self.config)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}
