//! Signing sessions
//!
//! Tracks a transaction through its required signer set. Sessions are keyed
//! by the transaction's content hash, so starting a session for identical
//! unsigned bytes resumes the existing one, and contributions are idempotent
//! per credential to support retransmission. The coordinator is passive: it
//! reacts to `contribute` calls and never polls anything.

use crate::error::{OracleError, OracleResult};
use crate::ledger::{KeyHash, OutputRef, Transaction, TxId, VkeyWitness};
use crate::tx::UnsignedTransaction;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info, warn};

/// Identifier of a signing session: the transaction content hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub TxId);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a session stands after a contribution or status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Signatures are still outstanding from these credentials.
    Pending { missing: Vec<KeyHash> },
    /// Every required credential has contributed; the transaction carries
    /// the assembled witness set.
    Complete { tx: Transaction },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SigningSession {
    unsigned: Transaction,
    required: BTreeSet<KeyHash>,
    witnesses: BTreeMap<KeyHash, VkeyWitness>,
    state_input: Option<OutputRef>,
    started_at: DateTime<Utc>,
}

impl SigningSession {
    fn status(&self) -> SessionStatus {
        let missing: Vec<KeyHash> = self
            .required
            .iter()
            .filter(|signer| !self.witnesses.contains_key(*signer))
            .copied()
            .collect();

        if missing.is_empty() {
            let mut tx = self.unsigned.clone();
            // BTreeMap order keeps the assembled witness list deterministic
            // and free of duplicates.
            tx.witnesses = self.witnesses.values().cloned().collect();
            SessionStatus::Complete { tx }
        } else {
            SessionStatus::Pending { missing }
        }
    }
}

/// Tracks in-flight signing sessions. Stateless apart from this map; the
/// blobs produced by `export` let sessions survive process restarts.
#[derive(Default)]
pub struct SignatureCoordinator {
    sessions: DashMap<TxId, SigningSession>,
}

impl SignatureCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session for an unsigned transaction. Starting the same
    /// transaction again resumes the existing session.
    pub fn start(&self, unsigned: &UnsignedTransaction) -> SessionId {
        let id = unsigned.id();
        self.sessions.entry(id).or_insert_with(|| {
            info!(
                session = %id,
                required = unsigned.required_signers.len(),
                "signing session opened"
            );
            SigningSession {
                unsigned: unsigned.tx.clone(),
                required: unsigned.required_signers.iter().copied().collect(),
                witnesses: BTreeMap::new(),
                state_input: unsigned.state_input,
                started_at: Utc::now(),
            }
        });
        SessionId(id)
    }

    /// Record one signer's witness.
    ///
    /// A credential outside the required set is rejected without touching
    /// session state. A repeated contribution from the same credential is a
    /// no-op that returns the current status.
    pub fn contribute(
        &self,
        session: &SessionId,
        witness: VkeyWitness,
    ) -> OracleResult<SessionStatus> {
        let mut entry = self
            .sessions
            .get_mut(&session.0)
            .ok_or_else(|| OracleError::UnknownSession {
                session: session.to_string(),
            })?;

        let signer = witness.key_hash();
        if !entry.required.contains(&signer) {
            warn!(session = %session, signer = %signer, "unexpected signer rejected");
            return Err(OracleError::UnexpectedSigner {
                signer: signer.to_string(),
            });
        }

        if entry.witnesses.contains_key(&signer) {
            debug!(session = %session, signer = %signer, "duplicate contribution ignored");
        } else {
            entry.witnesses.insert(signer, witness);
            info!(
                session = %session,
                signer = %signer,
                collected = entry.witnesses.len(),
                required = entry.required.len(),
                "witness recorded"
            );
        }

        Ok(entry.status())
    }

    pub fn status(&self, session: &SessionId) -> OracleResult<SessionStatus> {
        self.sessions
            .get(&session.0)
            .map(|entry| entry.status())
            .ok_or_else(|| OracleError::UnknownSession {
                session: session.to_string(),
            })
    }

    /// The state input the session's transaction consumes, for the
    /// staleness pre-flight at submission time.
    pub fn state_input(&self, session: &SessionId) -> OracleResult<Option<OutputRef>> {
        self.sessions
            .get(&session.0)
            .map(|entry| entry.state_input)
            .ok_or_else(|| OracleError::UnknownSession {
                session: session.to_string(),
            })
    }

    pub fn required_signers(&self, session: &SessionId) -> OracleResult<Vec<KeyHash>> {
        self.sessions
            .get(&session.0)
            .map(|entry| entry.required.iter().copied().collect())
            .ok_or_else(|| OracleError::UnknownSession {
                session: session.to_string(),
            })
    }

    /// The unsigned transaction and the witnesses collected so far.
    pub fn collected(
        &self,
        session: &SessionId,
    ) -> OracleResult<(Transaction, Vec<VkeyWitness>)> {
        self.sessions
            .get(&session.0)
            .map(|entry| {
                (
                    entry.unsigned.clone(),
                    entry.witnesses.values().cloned().collect(),
                )
            })
            .ok_or_else(|| OracleError::UnknownSession {
                session: session.to_string(),
            })
    }

    /// Abandon a session. Nothing has touched shared state, so this has no
    /// side effect beyond forgetting the collected witnesses.
    pub fn abandon(&self, session: &SessionId) -> bool {
        self.sessions.remove(&session.0).is_some()
    }

    /// Serialize a session as an opaque blob keyed by its transaction hash.
    pub fn export(&self, session: &SessionId) -> OracleResult<Vec<u8>> {
        let entry = self
            .sessions
            .get(&session.0)
            .ok_or_else(|| OracleError::UnknownSession {
                session: session.to_string(),
            })?;
        serde_json::to_vec(entry.value())
            .map_err(|e| OracleError::Internal(format!("session export failed: {}", e)))
    }

    /// Restore a session from an exported blob. Witnesses merge
    /// idempotently when the session already exists.
    pub fn restore(&self, blob: &[u8]) -> OracleResult<SessionId> {
        let restored: SigningSession = serde_json::from_slice(blob)
            .map_err(|e| OracleError::Internal(format!("session restore failed: {}", e)))?;
        let id = restored.unsigned.id();

        match self.sessions.get_mut(&id) {
            Some(mut existing) => {
                for (signer, witness) in restored.witnesses {
                    existing.witnesses.entry(signer).or_insert(witness);
                }
            }
            None => {
                self.sessions.insert(id, restored);
            }
        }
        Ok(SessionId(id))
    }
}
