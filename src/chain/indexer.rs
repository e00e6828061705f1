//! HTTP client for the indexer and submission services
//!
//! The engine depends only on the `IndexerApi`/`SubmissionApi` traits; this
//! is the one concrete adapter, speaking a small JSON contract. Transport
//! failures map to `NetworkError` (retryable), explicit ledger rejections to
//! `Rejected` (rebuild required).

use crate::chain::{IndexerApi, SubmissionApi};
use crate::error::{OracleError, OracleResult};
use crate::ledger::{Address, AssetId, OutputRef, TxId, TxOutput, Utxo, Value};
use crate::plutus::PlutusData;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct AssetDto {
    policy: String,
    name: String,
    quantity: u64,
}

#[derive(Debug, Deserialize)]
struct UtxoDto {
    tx_id: String,
    index: u16,
    address: String,
    lovelace: u64,
    #[serde(default)]
    assets: Vec<AssetDto>,
    #[serde(default)]
    datum: Option<String>,
    #[serde(default)]
    script: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TipDto {
    slot: u64,
}

#[derive(Debug, Deserialize)]
struct OutputStatusDto {
    unspent: bool,
}

#[derive(Debug, Serialize)]
struct SubmitDto {
    tx: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponseDto {
    tx_id: String,
}

#[derive(Debug, Deserialize)]
struct RejectionDto {
    reason: String,
}

pub struct HttpChainClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChainClient {
    pub fn new(base_url: impl Into<String>, timeout_ms: u64) -> OracleResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| OracleError::Config(format!("HTTP client build failed: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn net_err(e: reqwest::Error) -> OracleError {
        OracleError::NetworkError(e.to_string())
    }

    fn decode_utxo(dto: UtxoDto) -> OracleResult<Utxo> {
        let mut value = Value::lovelace(dto.lovelace);
        for asset in dto.assets {
            let policy = hex::decode(&asset.policy)
                .map_err(|e| OracleError::SchemaMismatch(format!("asset policy hex: {}", e)))?;
            let name = hex::decode(&asset.name)
                .map_err(|e| OracleError::SchemaMismatch(format!("asset name hex: {}", e)))?;
            value = value.with_asset(AssetId::new(policy, name), asset.quantity);
        }

        let datum = match dto.datum {
            Some(encoded) => {
                let bytes = hex::decode(&encoded)
                    .map_err(|e| OracleError::SchemaMismatch(format!("datum hex: {}", e)))?;
                Some(PlutusData::from_bytes(&bytes)?)
            }
            None => None,
        };

        let script = match dto.script {
            Some(encoded) => Some(
                hex::decode(&encoded)
                    .map_err(|e| OracleError::SchemaMismatch(format!("script hex: {}", e)))?,
            ),
            None => None,
        };

        let mut output = TxOutput::new(Address::from_hex(&dto.address)?, value);
        output.datum = datum;
        output.script = script;

        Ok(Utxo {
            reference: OutputRef::new(TxId::from_hex(&dto.tx_id)?, dto.index),
            output,
        })
    }
}

#[async_trait]
impl IndexerApi for HttpChainClient {
    async fn utxos_at(&self, address: &Address) -> OracleResult<Vec<Utxo>> {
        let url = self.url(&format!("addresses/{}/utxos", address.to_hex()));
        debug!(%url, "querying utxos");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(Self::net_err)?
            .error_for_status()
            .map_err(Self::net_err)?;
        let dtos: Vec<UtxoDto> = response.json().await.map_err(Self::net_err)?;
        dtos.into_iter().map(Self::decode_utxo).collect()
    }

    async fn latest_slot(&self) -> OracleResult<u64> {
        let response = self
            .client
            .get(self.url("tip"))
            .send()
            .await
            .map_err(Self::net_err)?
            .error_for_status()
            .map_err(Self::net_err)?;
        let tip: TipDto = response.json().await.map_err(Self::net_err)?;
        Ok(tip.slot)
    }

    async fn is_unspent(&self, reference: &OutputRef) -> OracleResult<bool> {
        let url = self.url(&format!(
            "outputs/{}/{}/status",
            reference.tx_id, reference.index
        ));
        let response = self.client.get(&url).send().await.map_err(Self::net_err)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let response = response.error_for_status().map_err(Self::net_err)?;
        let status: OutputStatusDto = response.json().await.map_err(Self::net_err)?;
        Ok(status.unspent)
    }
}

#[async_trait]
impl SubmissionApi for HttpChainClient {
    async fn submit_bytes(&self, tx: &[u8]) -> OracleResult<TxId> {
        let response = self
            .client
            .post(self.url("transactions"))
            .json(&SubmitDto {
                tx: hex::encode(tx),
            })
            .send()
            .await
            .map_err(Self::net_err)?;

        if response.status().is_client_error() {
            let reason = response
                .json::<RejectionDto>()
                .await
                .map(|r| r.reason)
                .unwrap_or_else(|_| "submission rejected".into());
            return Err(OracleError::Rejected { reason });
        }

        let response = response.error_for_status().map_err(Self::net_err)?;
        let accepted: SubmitResponseDto = response.json().await.map_err(Self::net_err)?;
        TxId::from_hex(&accepted.tx_id)
    }

    async fn is_confirmed(&self, id: &TxId) -> OracleResult<bool> {
        let url = self.url(&format!("transactions/{}", id));
        let response = self.client.get(&url).send().await.map_err(Self::net_err)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        response.error_for_status().map_err(Self::net_err)?;
        Ok(true)
    }
}
