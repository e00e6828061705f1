//! Transaction builder
//!
//! Composes chain snapshots, the state machine, the codec and the coin
//! selector into complete, balanced, unsigned transactions. This is the only
//! component that produces a `Transaction`, and it is deterministic given an
//! identical snapshot and request: inputs are ordered canonically and the
//! fee-convergence loop is stable for identical inputs.

use crate::chain::ChainSnapshot;
use crate::codec;
use crate::error::{OracleError, OracleResult};
use crate::ledger::{
    Address, KeyHash, OutputRef, SpendRedeemer, Transaction, TransactionBody, TxOutput, Value,
};
use crate::select;
use crate::state::machine::{self, Payout, Transition};
use crate::state::request::ActionRequest;
use crate::tx::fees::{FeeParams, VKEY_WITNESS_SIZE};

use std::collections::BTreeSet;
use tracing::{debug, info};

/// Bound on the fee-estimation loop.
const MAX_FEE_ITERATIONS: u32 = 8;

/// The party building and funding the transaction.
#[derive(Debug, Clone, Copy)]
pub struct WalletContext {
    pub address: Address,
    pub key: KeyHash,
}

/// A balanced, unsigned transaction plus the signer set it requires.
#[derive(Debug, Clone)]
pub struct UnsignedTransaction {
    pub tx: Transaction,
    pub required_signers: Vec<KeyHash>,
    /// The state UTxO consumed, when the action spends it. Used for the
    /// staleness pre-flight at submission time.
    pub state_input: Option<OutputRef>,
}

impl UnsignedTransaction {
    pub fn id(&self) -> crate::ledger::TxId {
        self.tx.id()
    }
}

/// Per-action transaction structure, derived before balancing.
struct TxPlan {
    consumes_state: bool,
    state_output: Option<TxOutput>,
    extra_outputs: Vec<TxOutput>,
    burn_marker: bool,
    /// Value the wallet must contribute beyond the fee.
    wallet_target: Value,
    /// Residual lovelace too small to form a valid output; charged into the
    /// fee so the transaction still balances.
    fold_dust: u64,
}

pub struct TransactionBuilder<'a> {
    snapshot: &'a ChainSnapshot,
    params: &'a FeeParams,
    wallet: WalletContext,
    ttl_slots: u64,
}

impl<'a> TransactionBuilder<'a> {
    pub fn new(
        snapshot: &'a ChainSnapshot,
        params: &'a FeeParams,
        wallet: WalletContext,
        ttl_slots: u64,
    ) -> Self {
        Self {
            snapshot,
            params,
            wallet,
            ttl_slots,
        }
    }

    /// Build a balanced unsigned transaction for `request`.
    ///
    /// Policy violations fail with `IllegalTransition` before any selection
    /// work; resource shortfalls fail with `InsufficientFunds` carrying the
    /// missing amounts.
    pub fn build(&self, request: &ActionRequest) -> OracleResult<UnsignedTransaction> {
        if let ActionRequest::CreateReferenceScript { .. } = request {
            if self.snapshot.reference_script.is_some() {
                return Err(OracleError::IllegalTransition {
                    action: request.kind(),
                    reason: "a reference script UTxO already exists".into(),
                });
            }
        }

        let state = &self.snapshot.state;
        let transition = machine::plan(state, request, self.snapshot.now_ms)?;
        let (next_state, payouts) = transition.apply(state);

        let plan = self.plan_structure(request, &transition, next_state, &payouts)?;
        let required_signers = request.required_signers(&state.settings, &self.wallet.key);
        let redeemer = codec::encode_request(request);

        let mut exclude = BTreeSet::new();
        exclude.insert(self.snapshot.state_ref());
        if let Some(script_utxo) = &self.snapshot.reference_script {
            exclude.insert(script_utxo.reference);
        }

        // Build, measure, re-balance until the fee implied by the size is
        // covered by the fee actually charged.
        let mut fee = self.params.linear_fee(0);
        for iteration in 0..MAX_FEE_ITERATIONS {
            let selection = select::select(
                &self.snapshot.wallet_utxos,
                &plan.wallet_target,
                fee,
                &exclude,
                &self.wallet.address,
                self.params,
            )?;

            let body = self.assemble(&plan, &selection, &redeemer, &required_signers)?;
            let size = body.to_bytes().len() + required_signers.len() * VKEY_WITNESS_SIZE;
            let required_fee = self.params.linear_fee(size);

            if required_fee <= body.fee {
                if size > self.params.max_tx_size {
                    return Err(OracleError::FeeEstimationFailed {
                        iterations: iteration + 1,
                    });
                }
                self.verify_balance(&plan, &selection, &body)?;
                info!(
                    action = request.kind(),
                    tx_id = %body.hash(),
                    fee = body.fee,
                    size,
                    inputs = body.inputs.len(),
                    "built unsigned transaction"
                );
                return Ok(UnsignedTransaction {
                    tx: Transaction::unsigned(body),
                    required_signers,
                    state_input: plan.consumes_state.then(|| self.snapshot.state_ref()),
                });
            }

            debug!(
                iteration,
                assumed = fee,
                required = required_fee,
                "fee estimate not yet converged"
            );
            fee = required_fee;
        }

        Err(OracleError::FeeEstimationFailed {
            iterations: MAX_FEE_ITERATIONS,
        })
    }

    /// Derive the output structure of the transaction for this action.
    fn plan_structure(
        &self,
        request: &ActionRequest,
        transition: &Transition,
        next_state: Option<crate::state::OracleState>,
        payouts: &[Payout],
    ) -> OracleResult<TxPlan> {
        let state_value = &self.snapshot.state_utxo.output.value;
        let payout_outputs = self.payout_outputs(payouts)?;
        let payout_total: u64 = payouts.iter().map(|p| p.amount).sum();

        match transition {
            Transition::Close { .. } => {
                // The marker burns; every remaining asset and the residual
                // reserve return to the wallet.
                let mut residual = state_value
                    .checked_sub(&Value::lovelace(payout_total))
                    .ok_or(OracleError::InsufficientFunds {
                        needed: payout_total,
                        available: state_value.lovelace,
                    })?;
                residual.assets.remove(&self.marker_asset());

                let residual_output = TxOutput::new(self.wallet.address, residual.clone());
                let min_residual = self.params.min_output_lovelace(&residual_output);

                let mut extra_outputs = payout_outputs;
                let mut fold_dust = 0;
                if residual.lovelace >= min_residual {
                    extra_outputs.push(residual_output);
                } else if residual.is_ada_only() {
                    // Unrepresentable dust; reconciled into the fee.
                    fold_dust = residual.lovelace;
                } else {
                    return Err(OracleError::InsufficientFunds {
                        needed: min_residual,
                        available: residual.lovelace,
                    });
                }

                Ok(TxPlan {
                    consumes_state: true,
                    state_output: None,
                    extra_outputs,
                    burn_marker: true,
                    wallet_target: Value::default(),
                    fold_dust,
                })
            }

            Transition::PublishScript { script } => {
                let script_output = self.script_output(script.clone());
                let deposit = script_output.value.lovelace;
                Ok(TxPlan {
                    consumes_state: false,
                    state_output: None,
                    extra_outputs: vec![script_output],
                    burn_marker: false,
                    wallet_target: Value::lovelace(deposit),
                    fold_dust: 0,
                })
            }

            _ => {
                let next_state = next_state.ok_or_else(|| {
                    OracleError::Internal("non-close transition produced no state".into())
                })?;

                let mut value = state_value.clone();
                if let Transition::AddFunds { amount } = transition {
                    value.lovelace += amount;
                }
                if payout_total > 0 {
                    value = value
                        .checked_sub(&Value::lovelace(payout_total))
                        .ok_or(OracleError::InsufficientFunds {
                            needed: payout_total,
                            available: state_value.lovelace,
                        })?;
                }

                let state_output = TxOutput::new(self.snapshot.oracle_address, value)
                    .with_datum(codec::encode_state(&next_state));
                let min_state = self.params.min_output_lovelace(&state_output);
                if state_output.value.lovelace < min_state {
                    return Err(OracleError::InsufficientFunds {
                        needed: min_state,
                        available: state_output.value.lovelace,
                    });
                }

                let wallet_target = match request {
                    ActionRequest::AddFunds { amount } => Value::lovelace(*amount),
                    _ => Value::default(),
                };

                Ok(TxPlan {
                    consumes_state: true,
                    state_output: Some(state_output),
                    extra_outputs: payout_outputs,
                    burn_marker: false,
                    wallet_target,
                    fold_dust: 0,
                })
            }
        }
    }

    fn payout_outputs(&self, payouts: &[Payout]) -> OracleResult<Vec<TxOutput>> {
        payouts
            .iter()
            .map(|payout| {
                let output = TxOutput::new(
                    Address::key(payout.to),
                    Value::lovelace(payout.amount),
                );
                let min = self.params.min_output_lovelace(&output);
                if payout.amount < min {
                    return Err(OracleError::InsufficientFunds {
                        needed: min,
                        available: payout.amount,
                    });
                }
                Ok(output)
            })
            .collect()
    }

    /// The published script output, carrying exactly its minimum value.
    fn script_output(&self, script: Vec<u8>) -> TxOutput {
        let mut output =
            TxOutput::new(self.snapshot.oracle_address, Value::default()).with_script(script);
        // The minimum depends on the output size, which depends on the
        // value; one refinement settles it.
        let first = self.params.min_output_lovelace(&output);
        output.value = Value::lovelace(first);
        let settled = self.params.min_output_lovelace(&output);
        output.value = Value::lovelace(settled);
        output
    }

    fn marker_asset(&self) -> crate::ledger::AssetId {
        self.snapshot.marker.clone()
    }

    fn assemble(
        &self,
        plan: &TxPlan,
        selection: &select::Selection,
        redeemer: &Option<crate::plutus::PlutusData>,
        required_signers: &[KeyHash],
    ) -> OracleResult<TransactionBody> {
        let mut inputs: Vec<OutputRef> = selection.inputs.iter().map(|u| u.reference).collect();
        if plan.consumes_state {
            inputs.push(self.snapshot.state_ref());
        }
        inputs.sort();

        let mut outputs = Vec::new();
        if let Some(state_output) = &plan.state_output {
            outputs.push(state_output.clone());
        }
        outputs.extend(plan.extra_outputs.iter().cloned());

        let fee = selection.fee + plan.fold_dust;
        if let Some(change) = &selection.change {
            outputs.push(TxOutput::new(self.wallet.address, change.clone()));
        }

        let mut mint = std::collections::BTreeMap::new();
        if plan.burn_marker {
            mint.insert(self.marker_asset(), -1i64);
        }

        let redeemers = match (plan.consumes_state, redeemer) {
            (true, Some(data)) => vec![SpendRedeemer {
                input: self.snapshot.state_ref(),
                data: data.clone(),
            }],
            _ => Vec::new(),
        };

        Ok(TransactionBody {
            inputs,
            outputs,
            fee,
            mint,
            required_signers: required_signers.to_vec(),
            redeemers,
            validity_start: Some(self.snapshot.slot),
            ttl: Some(self.snapshot.slot + self.ttl_slots),
        })
    }

    /// Redundant conservation check: inputs plus mint must equal outputs
    /// plus fee. A violation is an engine bug, never a user error.
    fn verify_balance(
        &self,
        plan: &TxPlan,
        selection: &select::Selection,
        body: &TransactionBody,
    ) -> OracleResult<()> {
        let mut total_in = Value::default();
        for utxo in &selection.inputs {
            total_in = total_in.merge(&utxo.output.value);
        }
        if plan.consumes_state {
            total_in = total_in.merge(&self.snapshot.state_utxo.output.value);
        }

        let mut total_out = Value::default();
        for output in &body.outputs {
            total_out = total_out.merge(&output.value);
        }
        total_out.lovelace += body.fee;

        for (asset, delta) in &body.mint {
            if *delta < 0 {
                total_out = total_out.merge(&Value {
                    lovelace: 0,
                    assets: [(asset.clone(), delta.unsigned_abs())].into_iter().collect(),
                });
            } else {
                total_in = total_in.merge(&Value {
                    lovelace: 0,
                    assets: [(asset.clone(), *delta as u64)].into_iter().collect(),
                });
            }
        }

        if total_in != total_out {
            return Err(OracleError::Internal(format!(
                "value not conserved: in {} vs out {}",
                total_in, total_out
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{AssetId, ScriptHash, TxId, Utxo};
    use crate::state::model::fixtures::{operator, state_with_nodes};
    use crate::state::{DataFeed, OracleState};

    const SLOT: u64 = 1_000;
    const NOW: u64 = 1_000_000;

    fn marker() -> AssetId {
        AssetId::new(vec![0xab; 28], b"AurigaState".to_vec())
    }

    fn oracle_address() -> Address {
        Address::script(ScriptHash([0x11; 28]))
    }

    fn wallet() -> WalletContext {
        WalletContext {
            address: Address::key(operator("wallet")),
            key: operator("wallet"),
        }
    }

    fn wallet_utxo(seed: u8, lovelace: u64) -> Utxo {
        Utxo {
            reference: OutputRef::new(TxId([seed; 32]), 0),
            output: TxOutput::new(wallet().address, Value::lovelace(lovelace)),
        }
    }

    fn snapshot(state: OracleState) -> ChainSnapshot {
        let state_utxo = Utxo {
            reference: OutputRef::new(TxId([0xee; 32]), 0),
            output: TxOutput::new(
                oracle_address(),
                Value::lovelace(60_000_000).with_asset(marker(), 1),
            )
            .with_datum(codec::encode_state(&state)),
        };
        ChainSnapshot {
            slot: SLOT,
            now_ms: NOW,
            oracle_address: oracle_address(),
            marker: marker(),
            state_utxo,
            state,
            reference_script: None,
            wallet_address: wallet().address,
            wallet_utxos: vec![wallet_utxo(1, 40_000_000), wallet_utxo(2, 8_000_000)],
        }
    }

    fn fresh_state(nodes: usize, fresh: usize) -> OracleState {
        let mut state = state_with_nodes(nodes);
        for node in state.nodes.iter_mut().take(fresh) {
            node.feed = Some(DataFeed {
                price: 5_000,
                updated_at: NOW - 10_000,
            });
        }
        state
    }

    fn build(snapshot: &ChainSnapshot, request: &ActionRequest) -> OracleResult<UnsignedTransaction> {
        let params = FeeParams::default();
        TransactionBuilder::new(snapshot, &params, wallet(), 1_200).build(request)
    }

    #[test]
    fn aggregate_builds_a_balanced_deterministic_tx() {
        let snapshot = snapshot(fresh_state(5, 4));
        let request = ActionRequest::Aggregate {
            aggregator: operator("node-0"),
        };

        let unsigned = build(&snapshot, &request).unwrap();
        assert_eq!(unsigned.state_input, Some(snapshot.state_ref()));
        assert!(unsigned.tx.body.inputs.contains(&snapshot.state_ref()));
        assert_eq!(unsigned.required_signers, vec![operator("node-0")]);
        assert!(unsigned.tx.body.fee >= FeeParams::default().min_fee_b);

        // The new state datum carries the recomputed price and timestamp.
        let state_output = &unsigned.tx.body.outputs[0];
        assert_eq!(state_output.address, oracle_address());
        assert_eq!(state_output.value.asset(&marker()), 1);
        let next = codec::decode_state(state_output.datum.as_ref().unwrap()).unwrap();
        let feed = next.feed.unwrap();
        assert_eq!(feed.updated_at, NOW);
        assert_eq!(feed.price, 5_000);

        // Identical snapshot and request build the identical transaction.
        let again = build(&snapshot, &request).unwrap();
        assert_eq!(again.id(), unsigned.id());
    }

    #[test]
    fn too_few_fresh_submissions_fail_before_selection() {
        let snapshot = snapshot(fresh_state(5, 2));
        let err = build(
            &snapshot,
            &ActionRequest::Aggregate {
                aggregator: operator("node-0"),
            },
        )
        .unwrap_err();
        assert!(matches!(err, OracleError::IllegalTransition { .. }));
    }

    #[test]
    fn add_funds_grows_the_state_value() {
        let snapshot = snapshot(fresh_state(3, 0));
        let unsigned = build(&snapshot, &ActionRequest::AddFunds { amount: 12_000_000 }).unwrap();
        let state_output = &unsigned.tx.body.outputs[0];
        assert_eq!(state_output.value.lovelace, 72_000_000);
        assert_eq!(unsigned.required_signers, vec![wallet().key]);
    }

    #[test]
    fn node_collect_pays_the_node_from_the_reserve() {
        let mut state = fresh_state(3, 0);
        state.nodes[0].reward = 5_000_000;
        let node = state.nodes[0].operator;
        let snapshot = snapshot(state);

        let unsigned = build(&snapshot, &ActionRequest::NodeCollect { node }).unwrap();
        let state_output = &unsigned.tx.body.outputs[0];
        assert_eq!(state_output.value.lovelace, 55_000_000);

        let payout = &unsigned.tx.body.outputs[1];
        assert_eq!(payout.address, Address::key(node));
        assert_eq!(payout.value.lovelace, 5_000_000);
        assert_eq!(unsigned.required_signers, vec![node]);
    }

    #[test]
    fn close_burns_the_marker_and_returns_funds() {
        let mut state = fresh_state(3, 0);
        state.nodes[1].reward = 4_000_000;
        let rewarded = state.nodes[1].operator;
        let snapshot = snapshot(state);

        let unsigned = build(&snapshot, &ActionRequest::Close).unwrap();
        assert_eq!(unsigned.tx.body.mint.get(&marker()), Some(&-1));
        // No output returns to the oracle address.
        assert!(unsigned
            .tx
            .body
            .outputs
            .iter()
            .all(|o| o.address != oracle_address()));
        // The residual reward is paid out and the remainder returns home.
        assert!(unsigned
            .tx
            .body
            .outputs
            .iter()
            .any(|o| o.address == Address::key(rewarded) && o.value.lovelace == 4_000_000));
        assert!(unsigned
            .tx
            .body
            .outputs
            .iter()
            .any(|o| o.address == wallet().address && o.value.lovelace == 56_000_000));
        assert_eq!(
            unsigned.required_signers,
            snapshot.state.settings.platform.required_signers()
        );
    }

    #[test]
    fn reference_script_requires_none_published() {
        let mut snapshot = snapshot(fresh_state(3, 0));
        let request = ActionRequest::CreateReferenceScript {
            script: vec![0xca, 0xfe, 0xba, 0xbe],
        };

        let unsigned = build(&snapshot, &request).unwrap();
        assert!(unsigned.state_input.is_none());
        let script_output = &unsigned.tx.body.outputs[0];
        assert_eq!(script_output.script.as_deref(), Some(&[0xca, 0xfe, 0xba, 0xbe][..]));
        assert!(
            script_output.value.lovelace
                >= FeeParams::default().min_output_lovelace(script_output)
        );

        snapshot.reference_script = Some(snapshot.state_utxo.clone());
        let err = build(&snapshot, &request).unwrap_err();
        assert!(matches!(err, OracleError::IllegalTransition { .. }));
    }

    #[test]
    fn wallet_shortfall_is_insufficient_funds() {
        let mut snapshot = snapshot(fresh_state(3, 0));
        snapshot.wallet_utxos = vec![wallet_utxo(1, 1_000_000)];
        let err = build(&snapshot, &ActionRequest::AddFunds { amount: 12_000_000 }).unwrap_err();
        assert!(matches!(err, OracleError::InsufficientFunds { .. }));
    }

    #[test]
    fn state_utxo_is_never_a_fee_input() {
        let snapshot = snapshot(fresh_state(5, 4));
        let unsigned = build(
            &snapshot,
            &ActionRequest::Aggregate {
                aggregator: operator("node-0"),
            },
        )
        .unwrap();
        // The state input appears exactly once, as the script input.
        let count = unsigned
            .tx
            .body
            .inputs
            .iter()
            .filter(|r| **r == snapshot.state_ref())
            .count();
        assert_eq!(count, 1);
        assert_eq!(unsigned.tx.body.redeemers.len(), 1);
        assert_eq!(unsigned.tx.body.redeemers[0].input, snapshot.state_ref());
    }
}
