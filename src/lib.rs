//! Auriga coordinator - off-chain transaction orchestration for a
//! decentralized price oracle on UTxO ledgers
//!
//! The engine models the oracle's on-chain state and its legal transitions,
//! builds balanced transactions for each action, coordinates multi-party
//! signature collection over out-of-band envelopes, and hands completed
//! transactions to the submission service. All chain access goes through the
//! narrow interfaces in [`chain`]; the engine itself holds no state between
//! invocations beyond in-flight signing sessions.

pub mod chain;
pub mod codec;
pub mod config;
pub mod error;
pub mod ledger;
pub mod multisig;
pub mod plutus;
pub mod select;
pub mod state;
pub mod tx;

pub use chain::{ChainQuery, ChainSnapshot, HttpChainClient, SubmissionGate};
pub use error::{OracleError, OracleResult};
pub use multisig::{SessionStatus, SignatureCoordinator, SigningEnvelope};
pub use state::{ActionRequest, OracleState};
pub use tx::{TransactionBuilder, UnsignedTransaction, WalletContext};
