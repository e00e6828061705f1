//! Coin selection
//!
//! Greedy largest-first selection over wallet UTxOs. Guarantees that the
//! selected value covers the required outputs plus the fee, that any change
//! output meets the minimum-value rule (dust change is folded into the fee),
//! and that the state and reference-script UTxOs are never selected.

use crate::error::{OracleError, OracleResult};
use crate::ledger::{Address, OutputRef, TxOutput, Utxo, Value};
use crate::tx::fees::FeeParams;

use std::collections::BTreeSet;
use tracing::debug;

/// Result of a selection round.
#[derive(Debug, Clone)]
pub struct Selection {
    pub inputs: Vec<Utxo>,
    /// Change returned to the wallet; `None` when the selection balances
    /// exactly or the remainder was folded into the fee.
    pub change: Option<Value>,
    /// The fee actually charged, including any folded dust.
    pub fee: u64,
}

/// Pick inputs from `candidates` covering `target` plus `fee`.
///
/// `exclude` must contain the state UTxO and, when present, the
/// reference-script UTxO. Outputs carrying datums or scripts are never
/// eligible as plain value inputs regardless of the exclusion set.
pub fn select(
    candidates: &[Utxo],
    target: &Value,
    fee: u64,
    exclude: &BTreeSet<OutputRef>,
    change_address: &Address,
    params: &FeeParams,
) -> OracleResult<Selection> {
    let mut eligible: Vec<&Utxo> = candidates
        .iter()
        .filter(|utxo| !exclude.contains(&utxo.reference))
        .filter(|utxo| utxo.output.datum.is_none() && utxo.output.script.is_none())
        .collect();
    // Largest-first, with the output reference as a stable tie-break so the
    // same snapshot always selects the same inputs.
    eligible.sort_by(|a, b| {
        b.output
            .value
            .lovelace
            .cmp(&a.output.value.lovelace)
            .then(a.reference.cmp(&b.reference))
    });

    let available: u64 = eligible.iter().map(|u| u.output.value.lovelace).sum();
    let needed = target.lovelace + fee;

    let mut chosen: Vec<Utxo> = Vec::new();
    let mut selected = Value::default();
    let mut pool = eligible.into_iter();

    let mut covered = false;
    while !covered {
        match pool.next() {
            Some(utxo) => {
                selected = selected.merge(&utxo.output.value);
                chosen.push(utxo.clone());
            }
            None => {
                return Err(OracleError::InsufficientFunds {
                    needed,
                    available,
                })
            }
        }
        covered = selected.contains(target) && selected.lovelace >= needed;
    }

    loop {
        let mut change = selected
            .checked_sub(target)
            .expect("selection covers the target");
        change.lovelace -= fee;

        if change.lovelace == 0 && change.is_ada_only() {
            return Ok(Selection {
                inputs: chosen,
                change: None,
                fee,
            });
        }

        let change_output = TxOutput::new(*change_address, change.clone());
        let min_change = params.min_output_lovelace(&change_output);

        if change.lovelace >= min_change {
            return Ok(Selection {
                inputs: chosen,
                change: Some(change),
                fee,
            });
        }

        if change.is_ada_only() {
            // Dust change cannot form a valid output.
            debug!(dust = change.lovelace, "folding dust change into fee");
            return Ok(Selection {
                inputs: chosen,
                change: None,
                fee: fee + change.lovelace,
            });
        }

        // Change carries assets and must exist; top it up with another input.
        match pool.next() {
            Some(utxo) => {
                selected = selected.merge(&utxo.output.value);
                chosen.push(utxo.clone());
            }
            None => {
                return Err(OracleError::InsufficientFunds {
                    needed: target.lovelace + fee + min_change,
                    available,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{AssetId, KeyHash, TxId};

    fn wallet() -> Address {
        Address::key(KeyHash::of_vkey(b"wallet"))
    }

    fn utxo(seed: u8, lovelace: u64) -> Utxo {
        Utxo {
            reference: OutputRef::new(TxId([seed; 32]), 0),
            output: TxOutput::new(wallet(), Value::lovelace(lovelace)),
        }
    }

    #[test]
    fn covers_target_plus_fee_largest_first() {
        let candidates = vec![utxo(1, 2_000_000), utxo(2, 30_000_000), utxo(3, 5_000_000)];
        let target = Value::lovelace(10_000_000);
        let selection = select(
            &candidates,
            &target,
            200_000,
            &BTreeSet::new(),
            &wallet(),
            &FeeParams::default(),
        )
        .unwrap();

        assert_eq!(selection.inputs.len(), 1);
        assert_eq!(selection.inputs[0].reference.tx_id, TxId([2; 32]));
        let change = selection.change.unwrap();
        assert_eq!(change.lovelace, 30_000_000 - 10_000_000 - 200_000);
    }

    #[test]
    fn never_selects_excluded_utxos() {
        let state = utxo(1, 50_000_000);
        let candidates = vec![state.clone(), utxo(2, 20_000_000)];
        let mut exclude = BTreeSet::new();
        exclude.insert(state.reference);

        let selection = select(
            &candidates,
            &Value::lovelace(5_000_000),
            200_000,
            &exclude,
            &wallet(),
            &FeeParams::default(),
        )
        .unwrap();
        assert!(selection
            .inputs
            .iter()
            .all(|u| u.reference != state.reference));
    }

    #[test]
    fn never_selects_datum_bearing_outputs() {
        use crate::plutus::PlutusData;
        let mut scripted = utxo(1, 50_000_000);
        scripted.output.datum = Some(PlutusData::int(1u64));
        let candidates = vec![scripted, utxo(2, 20_000_000)];

        let selection = select(
            &candidates,
            &Value::lovelace(5_000_000),
            200_000,
            &BTreeSet::new(),
            &wallet(),
            &FeeParams::default(),
        )
        .unwrap();
        assert_eq!(selection.inputs[0].reference.tx_id, TxId([2; 32]));
    }

    #[test]
    fn dust_change_is_folded_into_fee() {
        // One input barely above the target: the remainder cannot carry a
        // valid change output.
        let candidates = vec![utxo(1, 10_200_001)];
        let selection = select(
            &candidates,
            &Value::lovelace(10_000_000),
            200_000,
            &BTreeSet::new(),
            &wallet(),
            &FeeParams::default(),
        )
        .unwrap();
        assert!(selection.change.is_none());
        assert_eq!(selection.fee, 200_001);
    }

    #[test]
    fn exact_balance_has_no_change() {
        let candidates = vec![utxo(1, 10_200_000)];
        let selection = select(
            &candidates,
            &Value::lovelace(10_000_000),
            200_000,
            &BTreeSet::new(),
            &wallet(),
            &FeeParams::default(),
        )
        .unwrap();
        assert!(selection.change.is_none());
        assert_eq!(selection.fee, 200_000);
    }

    #[test]
    fn insufficient_funds_reports_amounts() {
        let candidates = vec![utxo(1, 1_000_000)];
        let err = select(
            &candidates,
            &Value::lovelace(10_000_000),
            200_000,
            &BTreeSet::new(),
            &wallet(),
            &FeeParams::default(),
        )
        .unwrap_err();
        match err {
            OracleError::InsufficientFunds { needed, available } => {
                assert_eq!(needed, 10_200_000);
                assert_eq!(available, 1_000_000);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn asset_change_is_topped_up_to_minimum() {
        let marker = AssetId::new(vec![9u8; 28], b"Token".to_vec());
        let mut with_asset = utxo(1, 10_100_000);
        with_asset.output.value = Value::lovelace(10_100_000).with_asset(marker.clone(), 5);
        // Asset-bearing change needs more lovelace than the remainder of the
        // first input; the selector must pull in the second.
        let candidates = vec![with_asset, utxo(2, 4_000_000)];

        let selection = select(
            &candidates,
            &Value::lovelace(10_000_000),
            100_000,
            &BTreeSet::new(),
            &wallet(),
            &FeeParams::default(),
        )
        .unwrap();
        assert_eq!(selection.inputs.len(), 2);
        let change = selection.change.unwrap();
        assert_eq!(change.asset(&marker), 5);
        let change_output = TxOutput::new(wallet(), change.clone());
        assert!(change.lovelace >= FeeParams::default().min_output_lovelace(&change_output));
    }
}
