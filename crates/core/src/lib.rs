//! `tokengate-core`: domain building blocks for one-time-token validation.
//!
//! This crate contains **pure domain** primitives (no cryptography, no storage).

pub mod clock;
pub mod error;
pub mod identity;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ValidationError, ValidationResult};
pub use identity::ClientIdentity;
