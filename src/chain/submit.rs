//! Submission gate
//!
//! Hands a fully signed transaction to the submission service and interprets
//! the result. Network failures retry the identical bytes with a bounded
//! delay loop; a ledger rejection is final for these bytes and the caller
//! must rebuild from a fresh snapshot. A pre-flight check surfaces stale
//! transactions before any network call is spent on them.

use crate::chain::{IndexerApi, SubmissionApi};
use crate::error::{OracleError, OracleResult};
use crate::ledger::{KeyHash, OutputRef, Transaction, TxId};

use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Retry and confirmation-poll settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitConfig {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub confirm_max_polls: u32,
    pub confirm_poll_delay_ms: u64,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 2_000,
            confirm_max_polls: 10,
            confirm_poll_delay_ms: 20_000,
        }
    }
}

/// Outcome of waiting for confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    TimedOut,
}

pub struct SubmissionGate {
    submitter: Arc<dyn SubmissionApi>,
    indexer: Arc<dyn IndexerApi>,
    config: SubmitConfig,
}

impl SubmissionGate {
    pub fn new(
        submitter: Arc<dyn SubmissionApi>,
        indexer: Arc<dyn IndexerApi>,
        config: SubmitConfig,
    ) -> Self {
        Self {
            submitter,
            indexer,
            config,
        }
    }

    /// Submit a fully signed transaction.
    ///
    /// `required` is the transaction's required signer set; the gate refuses
    /// to submit unless the witness credentials form a superset of it.
    /// `state_input` is the state UTxO the transaction consumes, checked to
    /// still be unspent before the first network call.
    pub async fn submit(
        &self,
        tx: &Transaction,
        required: &[KeyHash],
        state_input: Option<&OutputRef>,
    ) -> OracleResult<TxId> {
        let witnessed: BTreeSet<KeyHash> = tx.witness_key_hashes().into_iter().collect();
        let missing: Vec<String> = required
            .iter()
            .filter(|signer| !witnessed.contains(signer))
            .map(|signer| signer.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(OracleError::IncompleteWitnessSet {
                missing: missing.join(", "),
            });
        }

        if let Some(reference) = state_input {
            if !self.indexer.is_unspent(reference).await? {
                return Err(OracleError::StaleTransaction {
                    input: reference.to_string(),
                });
            }
        }

        let bytes = tx.to_bytes();
        let tx_id = tx.id();
        let mut attempts = 0;
        let mut last_error = None;

        while attempts < self.config.max_attempts {
            attempts += 1;

            match self.submitter.submit_bytes(&bytes).await {
                Ok(accepted) => {
                    info!(
                        tx_id = %accepted,
                        attempt = attempts,
                        "transaction submitted"
                    );
                    return Ok(accepted);
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        tx_id = %tx_id,
                        attempt = attempts,
                        error = %e,
                        "retryable submission failure"
                    );
                    last_error = Some(e);
                    if attempts < self.config.max_attempts {
                        tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms))
                            .await;
                    }
                }
                // Rejection is final for these bytes: the state input was
                // typically consumed by a competing transaction.
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| OracleError::NetworkError("submission failed".into())))
    }

    /// Poll the ledger for confirmation of `tx_id`, bounded by the
    /// configured attempt count.
    pub async fn wait_for_confirmation(&self, tx_id: &TxId) -> OracleResult<Confirmation> {
        for poll in 0..self.config.confirm_max_polls {
            if self.submitter.is_confirmed(tx_id).await? {
                info!(tx_id = %tx_id, "transaction confirmed");
                return Ok(Confirmation::Confirmed);
            }
            info!(
                tx_id = %tx_id,
                poll = poll + 1,
                "waiting for confirmation"
            );
            tokio::time::sleep(Duration::from_millis(self.config.confirm_poll_delay_ms)).await;
        }
        warn!(tx_id = %tx_id, "confirmation not observed; giving up");
        Ok(Confirmation::TimedOut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{MockIndexerApi, MockSubmissionApi};
    use crate::ledger::{TransactionBody, VkeyWitness};

    fn config() -> SubmitConfig {
        SubmitConfig {
            max_attempts: 3,
            retry_delay_ms: 1,
            confirm_max_polls: 2,
            confirm_poll_delay_ms: 1,
        }
    }

    fn signed_tx(signers: &[&[u8]]) -> (Transaction, Vec<KeyHash>) {
        let body = TransactionBody::default();
        let witnesses: Vec<VkeyWitness> = signers
            .iter()
            .map(|vkey| VkeyWitness {
                vkey: vkey.to_vec(),
                signature: vec![0u8; 64],
            })
            .collect();
        let required = witnesses.iter().map(VkeyWitness::key_hash).collect();
        (Transaction { body, witnesses }, required)
    }

    #[tokio::test]
    async fn refuses_incomplete_witness_sets() {
        let (mut tx, required) = signed_tx(&[b"owner", b"platform-1"]);
        tx.witnesses.pop();

        let gate = SubmissionGate::new(
            Arc::new(MockSubmissionApi::new()),
            Arc::new(MockIndexerApi::new()),
            config(),
        );
        let err = gate.submit(&tx, &required, None).await.unwrap_err();
        assert!(matches!(err, OracleError::IncompleteWitnessSet { .. }));
    }

    #[tokio::test]
    async fn stale_state_input_is_detected_before_submission() {
        let (tx, required) = signed_tx(&[b"owner"]);
        let state_ref = OutputRef::new(TxId([1; 32]), 0);

        let mut indexer = MockIndexerApi::new();
        indexer.expect_is_unspent().returning(|_| Ok(false));
        let mut submitter = MockSubmissionApi::new();
        submitter.expect_submit_bytes().never();

        let gate = SubmissionGate::new(Arc::new(submitter), Arc::new(indexer), config());
        let err = gate
            .submit(&tx, &required, Some(&state_ref))
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::StaleTransaction { .. }));
        assert!(err.requires_rebuild());
    }

    #[tokio::test]
    async fn network_errors_retry_then_surface() {
        let (tx, required) = signed_tx(&[b"owner"]);
        let mut submitter = MockSubmissionApi::new();
        submitter
            .expect_submit_bytes()
            .times(3)
            .returning(|_| Err(OracleError::NetworkError("connection refused".into())));

        let gate = SubmissionGate::new(
            Arc::new(submitter),
            Arc::new(MockIndexerApi::new()),
            config(),
        );
        let err = gate.submit(&tx, &required, None).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn rejection_is_not_retried() {
        let (tx, required) = signed_tx(&[b"owner"]);
        let mut submitter = MockSubmissionApi::new();
        submitter
            .expect_submit_bytes()
            .times(1)
            .returning(|_| {
                Err(OracleError::Rejected {
                    reason: "input already spent".into(),
                })
            });

        let gate = SubmissionGate::new(
            Arc::new(submitter),
            Arc::new(MockIndexerApi::new()),
            config(),
        );
        let err = gate.submit(&tx, &required, None).await.unwrap_err();
        assert!(err.requires_rebuild());
    }

    #[tokio::test]
    async fn confirmation_polls_are_bounded() {
        let (tx, _) = signed_tx(&[b"owner"]);
        let mut submitter = MockSubmissionApi::new();
        submitter
            .expect_is_confirmed()
            .times(2)
            .returning(|_| Ok(false));

        let gate = SubmissionGate::new(
            Arc::new(submitter),
            Arc::new(MockIndexerApi::new()),
            config(),
        );
        let outcome = gate.wait_for_confirmation(&tx.id()).await.unwrap();
        assert_eq!(outcome, Confirmation::TimedOut);
    }
}
