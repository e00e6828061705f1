//! Signing envelopes
//!
//! The unsigned transaction and its partial witness set travel between
//! parties as an opaque serialized envelope. The transport is whatever the
//! parties choose (a file, a message); this module defines only the logical
//! content. Opening an envelope for a transaction hash that is already known
//! resumes the existing session and merges witnesses idempotently.

use crate::error::{OracleError, OracleResult};
use crate::ledger::{KeyHash, OutputRef, Transaction, VkeyWitness};
use crate::multisig::session::{SessionId, SessionStatus, SignatureCoordinator};
use crate::tx::UnsignedTransaction;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningEnvelope {
    /// Hex of the unsigned transaction wire bytes.
    pub tx: String,
    pub required_signers: Vec<KeyHash>,
    pub state_input: Option<OutputRef>,
    /// Witnesses collected so far.
    pub witnesses: Vec<VkeyWitness>,
}

impl SigningEnvelope {
    /// Envelope for a freshly built transaction with no witnesses yet.
    pub fn from_unsigned(unsigned: &UnsignedTransaction) -> Self {
        Self {
            tx: hex::encode(unsigned.tx.to_bytes()),
            required_signers: unsigned.required_signers.clone(),
            state_input: unsigned.state_input,
            witnesses: Vec::new(),
        }
    }

    /// Envelope carrying a session's current progress, for handing the
    /// signing round to the next party.
    pub fn from_session(
        coordinator: &SignatureCoordinator,
        session: &SessionId,
    ) -> OracleResult<Self> {
        let (unsigned, witnesses) = coordinator.collected(session)?;
        Ok(Self {
            tx: hex::encode(unsigned.to_bytes()),
            required_signers: coordinator.required_signers(session)?,
            state_input: coordinator.state_input(session)?,
            witnesses,
        })
    }

    pub fn to_bytes(&self) -> OracleResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| OracleError::Internal(format!("envelope encode failed: {}", e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> OracleResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| OracleError::Internal(format!("envelope decode failed: {}", e)))
    }

    /// Feed this envelope into a coordinator: resume (or open) the session
    /// for its transaction and merge every carried witness.
    pub fn open(
        &self,
        coordinator: &SignatureCoordinator,
    ) -> OracleResult<(SessionId, SessionStatus)> {
        let tx_bytes = hex::decode(&self.tx)
            .map_err(|e| OracleError::Internal(format!("envelope tx hex: {}", e)))?;
        let tx = Transaction::from_bytes(&tx_bytes)?;

        let unsigned = UnsignedTransaction {
            tx: Transaction::unsigned(tx.body),
            required_signers: self.required_signers.clone(),
            state_input: self.state_input,
        };
        let session = coordinator.start(&unsigned);

        let mut status = coordinator.status(&session)?;
        for witness in &self.witnesses {
            status = coordinator.contribute(&session, witness.clone())?;
        }
        Ok((session, status))
    }
}
