//! Multi-party signature coordination
//!
//! This module provides:
//! - Signing sessions keyed by transaction content hash
//! - Serialized envelopes for out-of-band signature transport
//! - Pre-sign review of transactions built by other parties

pub mod envelope;
pub mod review;
pub mod session;

pub use envelope::SigningEnvelope;
pub use review::TxReview;
pub use session::{SessionId, SessionStatus, SignatureCoordinator};
