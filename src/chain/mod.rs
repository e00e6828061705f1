//! Chain access seams
//!
//! This module provides:
//! - The narrow indexer and submission interfaces the engine consumes
//! - Snapshot-based state resolution (ChainQuery)
//! - The submission gate with retry and staleness handling
//! - A thin HTTP client implementing both interfaces

pub mod indexer;
pub mod query;
pub mod submit;

pub use indexer::HttpChainClient;
pub use query::{ChainQuery, ChainSnapshot};
pub use submit::{Confirmation, SubmissionGate, SubmitConfig};

use crate::error::OracleResult;
use crate::ledger::{Address, OutputRef, TxId, Utxo};

use async_trait::async_trait;

/// Read-only indexer interface. Every call returns a consistent snapshot;
/// the caller must not assume it remains valid past a submission.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IndexerApi: Send + Sync {
    /// All unspent outputs currently at `address`.
    async fn utxos_at(&self, address: &Address) -> OracleResult<Vec<Utxo>>;

    /// The slot of the chain tip.
    async fn latest_slot(&self) -> OracleResult<u64>;

    /// Whether `reference` is still unspent.
    async fn is_unspent(&self, reference: &OutputRef) -> OracleResult<bool>;
}

/// Transaction submission interface.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubmissionApi: Send + Sync {
    /// Hand fully witnessed transaction bytes to the ledger. Submission is
    /// idempotent at the ledger level via the transaction's own hash.
    async fn submit_bytes(&self, tx: &[u8]) -> OracleResult<TxId>;

    /// Whether the transaction has been confirmed.
    async fn is_confirmed(&self, id: &TxId) -> OracleResult<bool>;
}
