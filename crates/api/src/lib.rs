//! Validation pipelines and the `TokenGate` service facade.

pub mod checks;
pub mod context;
pub mod pipeline;
pub mod service;

pub use checks::{ClientAuthCheck, RateLimitCheck, ReplayCheck, TokenCheck, build_checks};
pub use context::TokenCandidate;
pub use pipeline::{INVALID_TOKEN_FORMAT, MALFORMED_MESSAGE_FORMAT, MessageValidator, TokenValidator};
pub use service::{DynStore, TokenGate};
