//! Pre-sign transaction review
//!
//! Before contributing a signature to a transaction built by another party,
//! a signer can check it against freshly resolved chain state: the
//! transaction must consume the current state UTxO, must actually require
//! this signer, and must not demand signatures from credentials outside the
//! oracle's authority and node set. A builder may legitimately spend the
//! reviewer's own wallet inputs only when the reviewer balanced the
//! transaction themselves, so that check is opt-in.

use crate::error::{OracleError, OracleResult};
use crate::ledger::{KeyHash, OutputRef, Transaction, Utxo};
use crate::state::request::allowed_signer;
use crate::state::OracleState;

use tracing::warn;

/// Findings of a review, evaluated once against one snapshot.
#[derive(Debug, Clone)]
pub struct TxReview {
    consumes_state: bool,
    own_signature_required: bool,
    foreign_signers: Vec<KeyHash>,
    spends_own_inputs: bool,
}

impl TxReview {
    /// Evaluate `tx` from the point of view of `own_key`.
    ///
    /// `state_input` is the current state UTxO reference and `state` its
    /// decoded record; `own_utxos` are the reviewer's wallet UTxOs.
    pub fn evaluate(
        tx: &Transaction,
        own_key: &KeyHash,
        state: &OracleState,
        state_input: &OutputRef,
        own_utxos: &[Utxo],
    ) -> Self {
        let consumes_state = tx.body.inputs.contains(state_input);
        if !consumes_state {
            warn!("transaction does not consume the current state UTxO");
        }

        let own_signature_required = tx.body.required_signers.contains(own_key);
        if !own_signature_required {
            warn!("transaction does not require a signature from this credential");
        }

        let foreign_signers: Vec<KeyHash> = tx
            .body
            .required_signers
            .iter()
            .filter(|signer| !allowed_signer(state, signer))
            .copied()
            .collect();
        for signer in &foreign_signers {
            warn!(signer = %signer, "required signer outside the oracle authority");
        }

        let spends_own_inputs = own_utxos
            .iter()
            .any(|utxo| tx.body.inputs.contains(&utxo.reference));

        Self {
            consumes_state,
            own_signature_required,
            foreign_signers,
            spends_own_inputs,
        }
    }

    /// Fail with `ReviewRejected` unless the transaction is safe to sign.
    pub fn raise_if_invalid(&self, allow_own_inputs: bool) -> OracleResult<()> {
        if !self.consumes_state {
            return Err(OracleError::ReviewRejected(
                "transaction does not consume the current state UTxO".into(),
            ));
        }
        if !self.own_signature_required {
            return Err(OracleError::ReviewRejected(
                "transaction does not require a signature from this credential".into(),
            ));
        }
        if let Some(signer) = self.foreign_signers.first() {
            return Err(OracleError::ReviewRejected(format!(
                "required signer {} is outside the oracle authority",
                signer
            )));
        }
        if self.spends_own_inputs && !allow_own_inputs {
            return Err(OracleError::ReviewRejected(
                "transaction spends this wallet's inputs".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Address, TransactionBody, TxId, TxOutput, Value};
    use crate::state::model::fixtures::{operator, state_with_nodes};

    fn state_ref() -> OutputRef {
        OutputRef::new(TxId([0xee; 32]), 0)
    }

    fn reviewed_tx(required: &[KeyHash], inputs: Vec<OutputRef>) -> Transaction {
        Transaction::unsigned(TransactionBody {
            inputs,
            required_signers: required.to_vec(),
            fee: 180_000,
            ..Default::default()
        })
    }

    #[test]
    fn accepts_a_well_formed_owner_transaction() {
        let state = state_with_nodes(3);
        let own = operator("platform-1");
        let required = state.settings.platform.required_signers();
        let tx = reviewed_tx(&required, vec![state_ref()]);

        let review = TxReview::evaluate(&tx, &own, &state, &state_ref(), &[]);
        assert!(review.raise_if_invalid(false).is_ok());
    }

    #[test]
    fn rejects_a_transaction_missing_the_state_input() {
        let state = state_with_nodes(3);
        let own = operator("owner");
        let tx = reviewed_tx(&[own], vec![OutputRef::new(TxId([1; 32]), 0)]);

        let review = TxReview::evaluate(&tx, &own, &state, &state_ref(), &[]);
        assert!(matches!(
            review.raise_if_invalid(false),
            Err(OracleError::ReviewRejected(_))
        ));
    }

    #[test]
    fn rejects_signers_outside_the_oracle_authority() {
        let state = state_with_nodes(3);
        let own = operator("owner");
        let tx = reviewed_tx(&[own, operator("mallory")], vec![state_ref()]);

        let review = TxReview::evaluate(&tx, &own, &state, &state_ref(), &[]);
        let err = review.raise_if_invalid(false).unwrap_err();
        assert!(err.to_string().contains("outside the oracle authority"));
    }

    #[test]
    fn own_inputs_are_rejected_unless_allowed() {
        let state = state_with_nodes(3);
        let own = operator("owner");
        let own_utxo = Utxo {
            reference: OutputRef::new(TxId([9; 32]), 2),
            output: TxOutput::new(Address::key(own), Value::lovelace(7_000_000)),
        };
        let tx = reviewed_tx(&[own], vec![state_ref(), own_utxo.reference]);

        let review = TxReview::evaluate(&tx, &own, &state, &state_ref(), &[own_utxo]);
        assert!(review.raise_if_invalid(false).is_err());
        assert!(review.raise_if_invalid(true).is_ok());
    }
}
