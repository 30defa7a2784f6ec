//! Deployment configuration.
//!
//! A [`TokenGateConfig`] is raw, deserializable input. It becomes usable only
//! through [`TokenGateConfig::validate`], which checks every field together and
//! returns an immutable [`ValidatedConfig`]. Nothing is partially applied.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tokengate_auth::{AllowList, AllowListError, IssuerKey, KeyError, OaepDigest};

pub const DEFAULT_REPLAY_GRACE_SECS: u64 = 300;
pub const DEFAULT_POOL_SIZE: u32 = 25;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_CHECKOUT_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u64 = 100;
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

const ENV_PREFIX: &str = "TOKENGATE_";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("invalid allowed_clients: {0}")]
    AllowList(#[from] AllowListError),

    #[error("invalid private_key: {0}")]
    Key(#[from] KeyError),

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("failed to read {path}: {reason}")]
    Io { path: String, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// A validation step that can be enabled in the token pipeline.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    ClientAuth,
    RateLimit,
    ReplayProtection,
}

impl CheckKind {
    pub const ALL: [CheckKind; 3] = [Self::ClientAuth, Self::RateLimit, Self::ReplayProtection];

    pub fn default_order() -> Vec<CheckKind> {
        Self::ALL.to_vec()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientAuth => "client_auth",
            Self::RateLimit => "rate_limit",
            Self::ReplayProtection => "replay_protection",
        }
    }
}

impl core::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| ConfigError::invalid("checks", format!("unknown check '{}'", s.trim())))
    }
}

/// Shared-store connection parameters.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub url: String,
    pub password: Option<String>,
    pub pool_size: u32,
    pub connect_timeout_ms: u64,
    pub operation_timeout_ms: u64,
    pub checkout_timeout_ms: u64,
}

impl StoreSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn checkout_timeout(&self) -> Duration {
        Duration::from_millis(self.checkout_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Missing("store.url"));
        }
        if self.pool_size == 0 {
            return Err(ConfigError::invalid("store.pool_size", "must be positive"));
        }
        for (field, value) in [
            ("store.connect_timeout_ms", self.connect_timeout_ms),
            ("store.operation_timeout_ms", self.operation_timeout_ms),
            ("store.checkout_timeout_ms", self.checkout_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be positive"));
            }
        }
        Ok(())
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            password: None,
            pool_size: DEFAULT_POOL_SIZE,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
            checkout_timeout_ms: DEFAULT_CHECKOUT_TIMEOUT_MS,
        }
    }
}

impl core::fmt::Debug for StoreSettings {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StoreSettings")
            .field("url", &self.url)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("pool_size", &self.pool_size)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("operation_timeout_ms", &self.operation_timeout_ms)
            .field("checkout_timeout_ms", &self.checkout_timeout_ms)
            .finish()
    }
}

/// Per-client request ceiling.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub max_requests: u64,
    pub window_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            window_secs: DEFAULT_RATE_LIMIT_WINDOW_SECS,
        }
    }
}

impl RateLimitSettings {
    pub fn enabled(max_requests: u64, window_secs: u64) -> Self {
        Self {
            enabled: true,
            max_requests,
            window_secs,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if self.max_requests == 0 {
            return Err(ConfigError::invalid("rate_limit.max_requests", "must be positive"));
        }
        if self.window_secs == 0 {
            return Err(ConfigError::invalid("rate_limit.window_secs", "must be positive"));
        }
        Ok(())
    }
}

fn default_replay_grace_secs() -> u64 {
    DEFAULT_REPLAY_GRACE_SECS
}

fn default_checks() -> Vec<CheckKind> {
    CheckKind::default_order()
}

/// Raw configuration as read from JSON or the environment.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenGateConfig {
    #[serde(default)]
    pub allowed_clients: Vec<String>,
    #[serde(default)]
    pub private_key: String,
    #[serde(default)]
    pub token_expiration_secs: Option<i64>,
    #[serde(default = "default_replay_grace_secs")]
    pub replay_grace_secs: u64,
    #[serde(default)]
    pub oaep_digest: OaepDigest,
    #[serde(default = "default_checks")]
    pub checks: Vec<CheckKind>,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
}

impl Default for TokenGateConfig {
    fn default() -> Self {
        Self {
            allowed_clients: Vec::new(),
            private_key: String::new(),
            token_expiration_secs: None,
            replay_grace_secs: DEFAULT_REPLAY_GRACE_SECS,
            oaep_digest: OaepDigest::default(),
            checks: CheckKind::default_order(),
            store: StoreSettings::default(),
            rate_limit: RateLimitSettings::default(),
        }
    }
}

impl core::fmt::Debug for TokenGateConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenGateConfig")
            .field("allowed_clients", &self.allowed_clients)
            .field("private_key", &"<redacted>")
            .field("token_expiration_secs", &self.token_expiration_secs)
            .field("replay_grace_secs", &self.replay_grace_secs)
            .field("oaep_digest", &self.oaep_digest)
            .field("checks", &self.checks)
            .field("store", &self.store)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

impl TokenGateConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = read_file(path)?;
        Self::from_json_str(&json)
    }

    /// Read `TOKENGATE_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Names carry the `TOKENGATE_`
    /// prefix; lists are comma separated. `TOKENGATE_PRIVATE_KEY_FILE` is read
    /// when `TOKENGATE_PRIVATE_KEY` is unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(clients) = var("ALLOWED_CLIENTS") {
            config.allowed_clients = split_list(&clients).map(str::to_string).collect();
        }

        if let Some(key) = lookup("TOKENGATE_PRIVATE_KEY").filter(|k| !k.trim().is_empty()) {
            config.private_key = key;
        } else if let Some(path) = var("PRIVATE_KEY_FILE") {
            config.private_key = read_file(Path::new(&path))?;
        }

        if let Some(v) = var("TOKEN_EXPIRATION_SECS") {
            config.token_expiration_secs = Some(parse_var("token_expiration_secs", &v)?);
        }
        if let Some(v) = var("REPLAY_GRACE_SECS") {
            config.replay_grace_secs = parse_var("replay_grace_secs", &v)?;
        }
        if let Some(v) = var("OAEP_DIGEST") {
            config.oaep_digest = v
                .parse()
                .map_err(|e: KeyError| ConfigError::invalid("oaep_digest", e.to_string()))?;
        }
        if let Some(v) = var("CHECKS") {
            config.checks = split_list(&v)
                .map(CheckKind::from_str)
                .collect::<Result<Vec<_>, _>>()?;
        }

        if let Some(v) = var("STORE_URL") {
            config.store.url = v;
        }
        // Passwords are taken verbatim; surrounding whitespace may be significant.
        config.store.password = lookup("TOKENGATE_STORE_PASSWORD").filter(|p| !p.is_empty());
        if let Some(v) = var("STORE_POOL_SIZE") {
            config.store.pool_size = parse_var("store.pool_size", &v)?;
        }
        if let Some(v) = var("STORE_CONNECT_TIMEOUT_MS") {
            config.store.connect_timeout_ms = parse_var("store.connect_timeout_ms", &v)?;
        }
        if let Some(v) = var("STORE_OPERATION_TIMEOUT_MS") {
            config.store.operation_timeout_ms = parse_var("store.operation_timeout_ms", &v)?;
        }
        if let Some(v) = var("STORE_CHECKOUT_TIMEOUT_MS") {
            config.store.checkout_timeout_ms = parse_var("store.checkout_timeout_ms", &v)?;
        }

        if let Some(v) = var("RATE_LIMIT_ENABLED") {
            config.rate_limit.enabled = parse_bool("rate_limit.enabled", &v)?;
        }
        if let Some(v) = var("RATE_LIMIT_MAX_REQUESTS") {
            config.rate_limit.max_requests = parse_var("rate_limit.max_requests", &v)?;
        }
        if let Some(v) = var("RATE_LIMIT_WINDOW_SECS") {
            config.rate_limit.window_secs = parse_var("rate_limit.window_secs", &v)?;
        }

        Ok(config)
    }

    /// Validate every field and parse the key. Fails on the first problem.
    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        let allow_list = AllowList::new(&self.allowed_clients)?;

        if self.private_key.trim().is_empty() {
            return Err(ConfigError::Missing("private_key"));
        }
        let key = IssuerKey::from_pem(&self.private_key)?;

        let token_expiration_secs = match self.token_expiration_secs {
            None => return Err(ConfigError::Missing("token_expiration_secs")),
            Some(secs) if secs <= 0 => {
                return Err(ConfigError::invalid("token_expiration_secs", "must be positive"));
            }
            Some(secs) => secs.unsigned_abs(),
        };

        if self.replay_grace_secs == 0 {
            return Err(ConfigError::invalid("replay_grace_secs", "must be positive"));
        }

        validate_checks(&self.checks)?;
        self.store.validate()?;
        self.rate_limit.validate()?;

        Ok(ValidatedConfig {
            allow_list,
            key,
            token_expiration_secs,
            replay_grace_secs: self.replay_grace_secs,
            oaep_digest: self.oaep_digest,
            checks: self.checks,
            store: self.store,
            rate_limit: self.rate_limit,
        })
    }
}

fn validate_checks(checks: &[CheckKind]) -> Result<(), ConfigError> {
    for (i, kind) in checks.iter().enumerate() {
        if checks[..i].contains(kind) {
            return Err(ConfigError::invalid("checks", format!("'{kind}' listed twice")));
        }
        if *kind == CheckKind::RateLimit && !checks[..i].contains(&CheckKind::ClientAuth) {
            return Err(ConfigError::invalid(
                "checks",
                "'rate_limit' must come after 'client_auth'",
            ));
        }
    }
    Ok(())
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_var<T: FromStr>(field: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse()
        .map_err(|_| ConfigError::invalid(field, format!("cannot parse '{raw}'")))
}

fn parse_bool(field: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(field, format!("cannot parse '{raw}' as a boolean"))),
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Configuration that passed validation. Immutable.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    allow_list: AllowList,
    key: IssuerKey,
    token_expiration_secs: u64,
    replay_grace_secs: u64,
    oaep_digest: OaepDigest,
    checks: Vec<CheckKind>,
    store: StoreSettings,
    rate_limit: RateLimitSettings,
}

impl ValidatedConfig {
    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    pub fn key(&self) -> &IssuerKey {
        &self.key
    }

    pub fn token_expiration_secs(&self) -> u64 {
        self.token_expiration_secs
    }

    pub fn replay_grace_secs(&self) -> u64 {
        self.replay_grace_secs
    }

    /// Lifetime of a replay record: expiration window plus grace.
    pub fn replay_ttl_secs(&self) -> u64 {
        self.token_expiration_secs.saturating_add(self.replay_grace_secs)
    }

    pub fn oaep_digest(&self) -> OaepDigest {
        self.oaep_digest
    }

    pub fn checks(&self) -> &[CheckKind] {
        &self.checks
    }

    pub fn has_check(&self, kind: CheckKind) -> bool {
        self.checks.contains(&kind)
    }

    pub fn store(&self) -> &StoreSettings {
        &self.store
    }

    pub fn rate_limit(&self) -> RateLimitSettings {
        self.rate_limit
    }
}
