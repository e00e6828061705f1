//! Oracle state model and the legal state transitions
//!
//! This module provides:
//! - The typed on-chain state record and its settings
//! - The transition policy enforced before any transaction is built
//! - Consensus math for price aggregation

pub mod aggregate;
pub mod machine;
pub mod model;
pub mod request;

pub use aggregate::Consensus;
pub use machine::{Payout, Transition};
pub use model::{
    DataFeed, Lifecycle, NodeEntry, OracleSettings, OracleState, PlatformAuthority, RewardPolicy,
};
pub use request::ActionRequest;
