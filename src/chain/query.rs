//! Snapshot-based chain state resolution
//!
//! All reads in one flow come from a single queried snapshot. Nothing here
//! mutates chain state; after any submission the caller must re-resolve
//! before building the next transaction.

use crate::chain::IndexerApi;
use crate::codec;
use crate::config::SlotConfig;
use crate::error::{OracleError, OracleResult};
use crate::ledger::{Address, AssetId, OutputRef, Utxo};
use crate::state::OracleState;

use std::sync::Arc;
use tracing::{debug, info};

/// A consistent view of everything one transaction flow needs.
#[derive(Debug, Clone)]
pub struct ChainSnapshot {
    pub slot: u64,
    /// On-chain POSIX time in milliseconds, derived from `slot`.
    pub now_ms: u64,
    pub oracle_address: Address,
    /// The state marker token identifying the single state UTxO.
    pub marker: AssetId,
    pub state_utxo: Utxo,
    pub state: OracleState,
    pub reference_script: Option<Utxo>,
    pub wallet_address: Address,
    pub wallet_utxos: Vec<Utxo>,
}

impl ChainSnapshot {
    pub fn state_ref(&self) -> OutputRef {
        self.state_utxo.reference
    }
}

/// Resolves on-chain facts into typed views.
pub struct ChainQuery {
    indexer: Arc<dyn IndexerApi>,
    oracle_address: Address,
    marker: AssetId,
    slot_config: SlotConfig,
}

impl ChainQuery {
    pub fn new(
        indexer: Arc<dyn IndexerApi>,
        oracle_address: Address,
        marker: AssetId,
        slot_config: SlotConfig,
    ) -> Self {
        Self {
            indexer,
            oracle_address,
            marker,
            slot_config,
        }
    }

    /// UTxOs at an address, optionally filtered by an attached asset.
    pub async fn resolve_utxos(
        &self,
        address: &Address,
        asset_filter: Option<&AssetId>,
    ) -> OracleResult<Vec<Utxo>> {
        let utxos = self.indexer.utxos_at(address).await?;
        Ok(match asset_filter {
            Some(asset) => utxos
                .into_iter()
                .filter(|u| u.output.value.asset(asset) > 0)
                .collect(),
            None => utxos,
        })
    }

    /// The single state UTxO and its decoded record. Zero candidates means
    /// the oracle does not exist (or was closed); more than one indicates a
    /// concurrency conflict and the flow must not proceed.
    pub async fn resolve_state(&self) -> OracleResult<(Utxo, OracleState)> {
        let mut candidates = self
            .resolve_utxos(&self.oracle_address, Some(&self.marker))
            .await?;

        match candidates.len() {
            0 => Err(OracleError::StateNotFound {
                address: self.oracle_address.to_string(),
            }),
            1 => {
                let utxo = candidates.remove(0);
                let datum = utxo.output.datum.as_ref().ok_or_else(|| {
                    OracleError::SchemaMismatch("state UTxO carries no datum".into())
                })?;
                let state = codec::decode_state(datum)?;
                debug!(state_ref = %utxo.reference, "resolved oracle state");
                Ok((utxo, state))
            }
            count => Err(OracleError::AmbiguousState {
                count,
                refs: candidates
                    .iter()
                    .map(|u| u.reference.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }

    /// The published reference-script UTxO, if any.
    pub async fn resolve_reference_script(&self) -> OracleResult<Option<Utxo>> {
        let utxos = self.indexer.utxos_at(&self.oracle_address).await?;
        Ok(utxos.into_iter().find(|u| u.output.script.is_some()))
    }

    /// Current slot and the on-chain time it maps to.
    pub async fn current_time(&self) -> OracleResult<(u64, u64)> {
        let slot = self.indexer.latest_slot().await?;
        Ok((slot, self.slot_config.posix_time_ms(slot)))
    }

    /// Resolve everything a transaction flow needs against one snapshot.
    pub async fn snapshot(&self, wallet_address: Address) -> OracleResult<ChainSnapshot> {
        let (slot, now_ms) = self.current_time().await?;
        let (state_utxo, state) = self.resolve_state().await?;
        let reference_script = self.resolve_reference_script().await?;
        let wallet_utxos = self.resolve_utxos(&wallet_address, None).await?;

        info!(
            slot,
            nodes = state.nodes.len(),
            wallet_utxos = wallet_utxos.len(),
            "chain snapshot resolved"
        );

        Ok(ChainSnapshot {
            slot,
            now_ms,
            oracle_address: self.oracle_address,
            marker: self.marker.clone(),
            state_utxo,
            state,
            reference_script,
            wallet_address,
            wallet_utxos,
        })
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockIndexerApi;
    use crate::ledger::{KeyHash, ScriptHash, TxId, TxOutput, Value};
    use crate::state::model::fixtures::state_with_nodes;

    fn marker() -> AssetId {
        AssetId::new(vec![0xab; 28], b"AurigaState".to_vec())
    }

    fn oracle_address() -> Address {
        Address::script(ScriptHash([0x11; 28]))
    }

    fn state_utxo(seed: u8) -> Utxo {
        let state = state_with_nodes(3);
        Utxo {
            reference: OutputRef::new(TxId([seed; 32]), 0),
            output: TxOutput::new(
                oracle_address(),
                Value::lovelace(50_000_000).with_asset(marker(), 1),
            )
            .with_datum(codec::encode_state(&state)),
        }
    }

    fn query(indexer: MockIndexerApi) -> ChainQuery {
        ChainQuery::new(
            Arc::new(indexer),
            oracle_address(),
            marker(),
            SlotConfig {
                zero_time_ms: 0,
                zero_slot: 0,
                slot_length_ms: 1_000,
            },
        )
    }

    #[tokio::test]
    async fn missing_state_is_reported() {
        let mut indexer = MockIndexerApi::new();
        indexer.expect_utxos_at().returning(|_| Ok(vec![]));
        let err = query(indexer).resolve_state().await.unwrap_err();
        assert!(matches!(err, OracleError::StateNotFound { .. }));
    }

    #[tokio::test]
    async fn duplicate_state_is_a_conflict() {
        let mut indexer = MockIndexerApi::new();
        indexer
            .expect_utxos_at()
            .returning(|_| Ok(vec![state_utxo(1), state_utxo(2)]));
        let err = query(indexer).resolve_state().await.unwrap_err();
        match err {
            OracleError::AmbiguousState { count, refs } => {
                assert_eq!(count, 2);
                assert!(refs.contains('#'));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unique_state_decodes() {
        let mut indexer = MockIndexerApi::new();
        indexer
            .expect_utxos_at()
            .returning(|_| Ok(vec![state_utxo(1)]));
        let (utxo, state) = query(indexer).resolve_state().await.unwrap();
        assert_eq!(utxo.reference.tx_id, TxId([1; 32]));
        assert_eq!(state.nodes.len(), 3);
    }

    #[tokio::test]
    async fn marker_filter_ignores_other_outputs() {
        let mut indexer = MockIndexerApi::new();
        let plain = Utxo {
            reference: OutputRef::new(TxId([9; 32]), 1),
            output: TxOutput::new(oracle_address(), Value::lovelace(2_000_000)),
        };
        indexer
            .expect_utxos_at()
            .returning(move |_| Ok(vec![plain.clone(), state_utxo(1)]));
        let (utxo, _) = query(indexer).resolve_state().await.unwrap();
        assert_eq!(utxo.reference.tx_id, TxId([1; 32]));
    }

    #[tokio::test]
    async fn reference_script_is_found_by_script_field() {
        let mut indexer = MockIndexerApi::new();
        let script_utxo = Utxo {
            reference: OutputRef::new(TxId([7; 32]), 0),
            output: TxOutput::new(oracle_address(), Value::lovelace(20_000_000))
                .with_script(vec![0xba, 0xbe]),
        };
        indexer
            .expect_utxos_at()
            .returning(move |_| Ok(vec![state_utxo(1), script_utxo.clone()]));
        let found = query(indexer).resolve_reference_script().await.unwrap();
        assert_eq!(found.unwrap().reference.tx_id, TxId([7; 32]));
    }

    #[test]
    fn key_hash_has_expected_width() {
        assert_eq!(KeyHash::of_vkey(b"x").as_bytes().len(), 28);
    }
}
