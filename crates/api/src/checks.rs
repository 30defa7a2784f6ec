//! Token check steps.
//!
//! The set of steps is closed; configuration only chooses which of them run
//! and in what order. Each step either passes the candidate on or stops the
//! pipeline with a typed error.

use std::sync::Arc;

use tracing::debug;

use tokengate_auth::AllowList;
use tokengate_core::{Clock, ValidationError, ValidationResult};
use tokengate_infra::{CheckKind, RateLimiter, ReplayGuard, ReplayOutcome, SharedStore, ValidatedConfig};

use crate::context::TokenCandidate;

/// One step of the token pipeline.
pub trait TokenCheck: Send + Sync {
    fn kind(&self) -> CheckKind;

    fn run(&self, candidate: &mut TokenCandidate<'_>) -> ValidationResult<()>;
}

/// Matches the token body against the allow-list.
#[derive(Debug, Clone)]
pub struct ClientAuthCheck {
    allow_list: AllowList,
}

impl ClientAuthCheck {
    pub fn new(allow_list: AllowList) -> Self {
        Self { allow_list }
    }
}

impl TokenCheck for ClientAuthCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::ClientAuth
    }

    fn run(&self, candidate: &mut TokenCandidate<'_>) -> ValidationResult<()> {
        let identity = self
            .allow_list
            .authorize(candidate.body())
            .ok_or(ValidationError::UnauthorizedClient)?;
        candidate.authorize(identity);
        Ok(())
    }
}

/// Counts the attempt against the authorized client's window.
#[derive(Debug)]
pub struct RateLimitCheck<S> {
    limiter: RateLimiter<S>,
}

impl<S: SharedStore> RateLimitCheck<S> {
    pub fn new(limiter: RateLimiter<S>) -> Self {
        Self { limiter }
    }
}

impl<S: SharedStore> TokenCheck for RateLimitCheck<S> {
    fn kind(&self) -> CheckKind {
        CheckKind::RateLimit
    }

    fn run(&self, candidate: &mut TokenCandidate<'_>) -> ValidationResult<()> {
        // Only ever rate-limit an identity that passed authorization.
        let identity = candidate
            .identity()
            .ok_or(ValidationError::UnauthorizedClient)?;
        let attempts = self.limiter.enforce(identity)?;
        candidate.record_attempts(attempts);
        Ok(())
    }
}

/// Consumes the token in the shared store.
#[derive(Debug)]
pub struct ReplayCheck<S> {
    guard: ReplayGuard<S>,
    expiration_secs: u64,
    ttl_secs: u64,
}

impl<S: SharedStore> ReplayCheck<S> {
    pub fn new(guard: ReplayGuard<S>, expiration_secs: u64, ttl_secs: u64) -> Self {
        Self {
            guard,
            expiration_secs,
            ttl_secs,
        }
    }
}

impl<S: SharedStore> TokenCheck for ReplayCheck<S> {
    fn kind(&self) -> CheckKind {
        CheckKind::ReplayProtection
    }

    fn run(&self, candidate: &mut TokenCandidate<'_>) -> ValidationResult<()> {
        let outcome = self.guard.validate_and_consume(
            candidate.plaintext(),
            self.ttl_secs,
            candidate.issued_at(),
            self.expiration_secs,
        );
        replay_result(outcome, ValidationError::StaleToken, ValidationError::UsedToken)
    }
}

/// Map a replay outcome onto the caller's stale/used errors.
pub(crate) fn replay_result(
    outcome: ReplayOutcome,
    stale: ValidationError,
    used: ValidationError,
) -> ValidationResult<()> {
    match outcome {
        ReplayOutcome::Ok => Ok(()),
        ReplayOutcome::Stale => Err(stale),
        ReplayOutcome::Used => Err(used),
        ReplayOutcome::InfrastructureError(err) => Err(ValidationError::infrastructure(format!(
            "replay check failed: {err}"
        ))),
    }
}

/// Instantiate the configured checks, in configured order.
pub fn build_checks<S>(config: &ValidatedConfig, store: S, clock: Arc<dyn Clock>) -> Vec<Box<dyn TokenCheck>>
where
    S: SharedStore + Clone + 'static,
{
    let checks: Vec<Box<dyn TokenCheck>> = config
        .checks()
        .iter()
        .map(|kind| -> Box<dyn TokenCheck> {
            match kind {
                CheckKind::ClientAuth => Box::new(ClientAuthCheck::new(config.allow_list().clone())),
                CheckKind::RateLimit => {
                    Box::new(RateLimitCheck::new(RateLimiter::new(store.clone(), config.rate_limit())))
                }
                CheckKind::ReplayProtection => Box::new(ReplayCheck::new(
                    ReplayGuard::new(store.clone(), clock.clone()),
                    config.token_expiration_secs(),
                    config.replay_ttl_secs(),
                )),
            }
        })
        .collect();

    debug!(
        checks = ?checks.iter().map(|c| c.kind().as_str()).collect::<Vec<_>>(),
        "token checks assembled"
    );
    checks
}

#[cfg(test)]
mod tests {
    use tokengate_auth::{ParsedPayload, PayloadGrammar, parse};
    use tokengate_core::{ClientIdentity, ManualClock};
    use tokengate_infra::testing::UnavailableStore;
    use tokengate_infra::{InMemoryStore, RateLimitSettings};

    use super::*;

    const T0: i64 = 1_700_000_000;

    fn payload(text: &str) -> ParsedPayload<'_> {
        parse(text, PayloadGrammar::Token).unwrap()
    }

    #[test]
    fn client_auth_resolves_identity() {
        let check = ClientAuthCheck::new(AllowList::new(["svcA"]).unwrap());

        let text = " svcA _1700000000";
        let mut candidate = TokenCandidate::new(text, payload(text));
        check.run(&mut candidate).unwrap();
        assert_eq!(candidate.identity(), Some(&ClientIdentity::new("svcA")));

        let text = "svcB_1700000000";
        let mut candidate = TokenCandidate::new(text, payload(text));
        assert_eq!(check.run(&mut candidate), Err(ValidationError::UnauthorizedClient));
        assert_eq!(candidate.identity(), None);
    }

    #[test]
    fn rate_limit_requires_an_identity() {
        let store = Arc::new(InMemoryStore::new());
        let check = RateLimitCheck::new(RateLimiter::new(store.clone(), RateLimitSettings::enabled(5, 60)));

        let text = "svcA_1700000000";
        let mut candidate = TokenCandidate::new(text, payload(text));
        assert_eq!(check.run(&mut candidate), Err(ValidationError::UnauthorizedClient));
        assert!(store.is_empty());

        candidate.authorize(ClientIdentity::new("svcA"));
        check.run(&mut candidate).unwrap();
        assert_eq!(candidate.attempts(), Some(1));
    }

    #[test]
    fn replay_outcomes_map_to_token_errors() {
        let clock = Arc::new(ManualClock::new(T0 + 10));
        let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
        let check = ReplayCheck::new(ReplayGuard::new(store, clock.clone()), 60, 360);

        let text = "svcA_1700000000";
        let mut candidate = TokenCandidate::new(text, payload(text));
        assert_eq!(check.run(&mut candidate), Ok(()));
        assert_eq!(check.run(&mut candidate), Err(ValidationError::UsedToken));

        clock.set(T0 + 61);
        assert_eq!(check.run(&mut candidate), Err(ValidationError::StaleToken));
    }

    #[test]
    fn replay_outage_is_an_infrastructure_error() {
        let check = ReplayCheck::new(
            ReplayGuard::new(UnavailableStore, Arc::new(ManualClock::new(T0))),
            60,
            360,
        );

        let text = "svcA_1700000000";
        let mut candidate = TokenCandidate::new(text, payload(text));
        let err = check.run(&mut candidate).unwrap_err();
        assert!(err.is_infrastructure());
        assert!(err.to_string().contains("replay check failed"));
    }
}
