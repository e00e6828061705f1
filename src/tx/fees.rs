//! Fee and minimum-value math
//!
//! The ledger charges a linear fee over the serialized transaction size and
//! enforces a size-dependent minimum lovelace on every output. Parameters are
//! protocol constants supplied through configuration.

use crate::ledger::TxOutput;

use serde::Deserialize;

/// Estimated wire size of one verification-key witness.
pub const VKEY_WITNESS_SIZE: usize = 102;

/// Fixed per-output overhead used by the minimum-value rule.
const OUTPUT_OVERHEAD_BYTES: u64 = 160;

/// Protocol fee parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct FeeParams {
    pub min_fee_a: u64,
    pub min_fee_b: u64,
    pub coins_per_utxo_byte: u64,
    pub max_tx_size: usize,
}

impl Default for FeeParams {
    fn default() -> Self {
        Self {
            min_fee_a: 44,
            min_fee_b: 155_381,
            coins_per_utxo_byte: 4_310,
            max_tx_size: 16_384,
        }
    }
}

impl FeeParams {
    /// Linear fee for a transaction of `size` bytes.
    pub fn linear_fee(&self, size: usize) -> u64 {
        self.min_fee_a * size as u64 + self.min_fee_b
    }

    /// Ledger-enforced minimum lovelace the given output must carry.
    pub fn min_output_lovelace(&self, output: &TxOutput) -> u64 {
        let mut bytes = Vec::new();
        ciborium::into_writer(output, &mut bytes)
            .expect("output serialization is infallible");
        (OUTPUT_OVERHEAD_BYTES + bytes.len() as u64) * self.coins_per_utxo_byte
    }
}
