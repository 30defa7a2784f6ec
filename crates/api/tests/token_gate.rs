//! Black-box tests of the public entry points, driven by envelopes sealed with
//! the fixture issuer key and an in-memory shared store.

use std::sync::Arc;

use tokengate_api::TokenGate;
use tokengate_auth::OaepDigest;
use tokengate_auth::testing::{EnvelopeSealer, ISSUER_KEY_PKCS8_PEM, OPENSSL_SHA1_ENVELOPE, issuer_key};
use tokengate_core::{ClientIdentity, ManualClock, ValidationError};
use tokengate_infra::testing::{UnavailableStore, capture_logs};
use tokengate_infra::{CheckKind, InMemoryStore, RateLimitSettings, SharedStore, StoreSettings, TokenGateConfig};

const ISSUED_AT: i64 = 1_700_000_000;

struct Harness {
    gate: TokenGate,
    store: Arc<InMemoryStore>,
    clock: Arc<ManualClock>,
    sealer: EnvelopeSealer,
}

impl Harness {
    fn new(config: TokenGateConfig) -> Self {
        let clock = Arc::new(ManualClock::new(ISSUED_AT + 10));
        let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
        let gate = TokenGate::new(config.validate().unwrap(), store.clone(), clock.clone());
        Self {
            gate,
            store,
            clock,
            sealer: EnvelopeSealer::new(&issuer_key(), OaepDigest::Sha1),
        }
    }

    fn seal(&self, plaintext: &str) -> String {
        self.sealer.seal(plaintext)
    }
}

fn config() -> TokenGateConfig {
    TokenGateConfig {
        allowed_clients: vec!["svcA".to_string(), "svcB".to_string()],
        private_key: ISSUER_KEY_PKCS8_PEM.to_string(),
        token_expiration_secs: Some(60),
        store: StoreSettings::new("redis://127.0.0.1:6379"),
        ..TokenGateConfig::default()
    }
}

fn rate_limited(max_requests: u64) -> TokenGateConfig {
    TokenGateConfig {
        rate_limit: RateLimitSettings::enabled(max_requests, 60),
        ..config()
    }
}

#[test]
fn fresh_token_is_valid_once() {
    let h = Harness::new(config());
    let envelope = h.seal("svcA_1700000000");

    let token = h.gate.validate_token(&envelope).unwrap();
    assert_eq!(token.identity(), Some(&ClientIdentity::new("svcA")));
    assert_eq!(token.client_name(), "svcA");
    assert_eq!(token.issued_at(), ISSUED_AT);

    h.clock.set(ISSUED_AT + 20);
    assert_eq!(h.gate.validate_token(&envelope), Err(ValidationError::UsedToken));
}

#[test]
fn expired_token_is_stale() {
    let h = Harness::new(config());
    h.clock.set(ISSUED_AT + 61);
    assert_eq!(
        h.gate.validate_token(h.seal("svcA_1700000000")),
        Err(ValidationError::StaleToken)
    );
}

#[test]
fn stale_wins_over_used() {
    let h = Harness::new(config());
    let envelope = h.seal("svcA_1700000000");
    h.gate.validate_token(&envelope).unwrap();

    h.clock.set(ISSUED_AT + 61);
    assert_eq!(h.gate.validate_token(&envelope), Err(ValidationError::StaleToken));
}

#[test]
fn unknown_client_is_unauthorized_without_store_writes() {
    let h = Harness::new(rate_limited(10));
    assert_eq!(
        h.gate.validate_token(h.seal("unknownSvc_1700000000")),
        Err(ValidationError::UnauthorizedClient)
    );
    assert!(h.store.is_empty());
}

#[test]
fn payload_without_timestamp_is_invalid() {
    let h = Harness::new(config());
    assert_eq!(
        h.gate.validate_token(h.seal("no_timestamp_suffix_here")),
        Err(ValidationError::InvalidToken("Invalid token format".to_string()))
    );
    assert!(h.store.is_empty());
}

#[test]
fn openssl_issued_token_is_accepted() {
    let h = Harness::new(config());
    let token = h.gate.validate_token(OPENSSL_SHA1_ENVELOPE.trim()).unwrap();
    assert_eq!(token.client_name(), "svcA");
}

#[test]
fn permissive_entry_point_has_the_same_side_effects() {
    let h = Harness::new(config());
    let envelope = h.seal("svcB_1700000000");

    assert!(h.gate.token_valid(&envelope));
    assert!(!h.gate.token_valid(&envelope));
    assert_eq!(h.gate.validate_token(&envelope), Err(ValidationError::UsedToken));
    assert!(!h.gate.token_valid(""));
}

#[test]
fn concurrent_presentations_consume_exactly_once() {
    let h = Harness::new(config());
    let envelope = h.seal("svcA_1700000000");

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..12)
            .map(|_| scope.spawn(|| h.gate.validate_token(&envelope)))
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| *r == Err(ValidationError::UsedToken))
    );
}

#[test]
fn rate_limit_applies_per_client_after_authorization() {
    let h = Harness::new(rate_limited(2));

    assert!(h.gate.token_valid(h.seal("svcA_1700000001")));
    assert!(h.gate.token_valid(h.seal("svcA_1700000002")));

    let err = h.gate.validate_token(h.seal("svcA_1700000003")).unwrap_err();
    assert_eq!(
        err.to_string(),
        "rate limit exceeded for svcA: 3/2 requests per 60s"
    );
    // The rejected token never reached replay protection.
    assert_eq!(h.store.get("svcA_1700000003").unwrap(), None);

    assert!(h.gate.token_valid(h.seal("svcB_1700000003")));

    let svc_a = ClientIdentity::new("svcA");
    assert_eq!(h.gate.rate_limiter().current_attempts(&svc_a), 3);
    h.gate.rate_limiter().reset(&svc_a);
    assert!(h.gate.token_valid(h.seal("svcA_1700000004")));
    assert_eq!(h.gate.rate_limiter().current_attempts(&svc_a), 1);
}

#[test]
fn rate_limit_window_expires() {
    let h = Harness::new(rate_limited(1));
    assert!(h.gate.token_valid(h.seal("svcA_1700000010")));
    assert!(!h.gate.token_valid(h.seal("svcA_1700000011")));

    h.clock.advance(60);
    assert!(h.gate.token_valid(h.seal("svcA_1700000070")));
}

#[test]
fn configured_check_order_is_honoured() {
    let h = Harness::new(TokenGateConfig {
        checks: vec![CheckKind::ReplayProtection],
        ..config()
    });

    // Without client_auth any client name is accepted, and no identity is resolved.
    let token = h.gate.validate_token(h.seal("unknownSvc_1700000000")).unwrap();
    assert_eq!(token.identity(), None);
    assert_eq!(token.client_name(), "unknownSvc");
}

#[test]
fn store_outage_fails_closed_for_replay_protection() {
    let clock = Arc::new(ManualClock::new(ISSUED_AT + 10));
    let gate = TokenGate::new(rate_limited(5).validate().unwrap(), Arc::new(UnavailableStore), clock);
    let sealer = EnvelopeSealer::new(&issuer_key(), OaepDigest::Sha1);

    let (result, logs) = capture_logs(|| gate.validate_token(sealer.seal("svcA_1700000000")));

    let err = result.unwrap_err();
    assert!(err.is_infrastructure(), "unexpected error: {err:?}");
    assert!(logs.contains(tracing::Level::WARN, "rate limiter store unavailable"));
    assert!(logs.contains(tracing::Level::ERROR, "replay guard store unavailable"));
    assert!(!logs.contents().contains("svcA_1700000000"));

    assert!(!gate.token_valid(sealer.seal("svcA_1700000000")));
    assert!(!gate.health_check());
}

#[test]
fn store_outage_fails_open_for_rate_limiting() {
    let config = TokenGateConfig {
        checks: vec![CheckKind::ClientAuth, CheckKind::RateLimit],
        ..rate_limited(1)
    };
    let clock = Arc::new(ManualClock::new(ISSUED_AT + 10));
    let gate = TokenGate::new(config.validate().unwrap(), Arc::new(UnavailableStore), clock);
    let sealer = EnvelopeSealer::new(&issuer_key(), OaepDigest::Sha1);

    for _ in 0..3 {
        assert!(gate.token_valid(sealer.seal("svcA_1700000000")));
    }
}

#[test]
fn private_messages_are_consumed_once() {
    let h = Harness::new(config());
    let envelope = h.seal("Invoice #42 paid, thanks!_1700000000");

    let message = h.gate.validate_message(&envelope).unwrap();
    assert_eq!(message.body(), "Invoice #42 paid, thanks!");
    assert_eq!(message.issued_at(), ISSUED_AT);

    assert!(!h.gate.message_valid(&envelope));
    assert_eq!(h.gate.validate_message(&envelope), Err(ValidationError::UsedMessage));
}

#[test]
fn private_message_errors() {
    let h = Harness::new(config());

    assert_eq!(
        h.gate.validate_message(""),
        Err(ValidationError::InvalidMessage("Message cannot be empty".to_string()))
    );
    assert_eq!(
        h.gate.validate_message(h.seal("tab\u{00e9}_1700000000")),
        Err(ValidationError::InvalidMessage("Malformed message format".to_string()))
    );

    h.clock.set(ISSUED_AT + 60);
    assert_eq!(
        h.gate.validate_message(h.seal("late_1700000000")),
        Err(ValidationError::StaleMessage)
    );
}

#[test]
fn health_check_pings_the_store() {
    let h = Harness::new(config());
    assert!(h.gate.health_check());
    h.gate.shutdown();
}

mod properties {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// Property: a body outside the allow-list is rejected before any
        /// rate-limit or replay write.
        #[test]
        fn unlisted_clients_never_touch_the_store(name in "[a-z]{1,12}", ts in 1_700_000_000i64..1_700_000_009) {
            prop_assume!(name != "svcA" && name != "svcB");
            let h = Harness::new(rate_limited(10));

            let result = h.gate.validate_token(h.seal(&format!("{name}_{ts}")));
            prop_assert_eq!(result, Err(ValidationError::UnauthorizedClient));
            prop_assert!(h.store.is_empty());
        }

        /// Property: a fresh token presented twice is valid, then used.
        #[test]
        fn second_presentation_is_used(ts in 1_699_999_960i64..1_700_000_010) {
            let h = Harness::new(config());
            let envelope = h.seal(&format!("svcA_{ts}"));

            prop_assert!(h.gate.validate_token(&envelope).is_ok());
            prop_assert_eq!(h.gate.validate_token(&envelope), Err(ValidationError::UsedToken));
        }
    }
}
