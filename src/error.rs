//! Error types for the Auriga coordinator

use thiserror::Error;

/// Main error type for the coordinator
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// A requested action is not legal from the current oracle state.
    /// Detected before any transaction is built or any network call is made.
    #[error("Illegal transition for {action}: {reason}")]
    IllegalTransition {
        action: &'static str,
        reason: String,
    },

    #[error("Insufficient funds: need {needed} lovelace, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("Oracle state not found at {address}")]
    StateNotFound { address: String },

    #[error("Ambiguous oracle state: {count} candidate UTxOs ({refs})")]
    AmbiguousState { count: usize, refs: String },

    /// The on-chain binary schema did not match. Indicates version skew
    /// between this engine and the deployed validator; never recoverable.
    #[error("Datum/redeemer schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Unexpected signer {signer}: not in the required signer set")]
    UnexpectedSigner { signer: String },

    #[error("Unknown signing session {session}")]
    UnknownSession { session: String },

    #[error("Witness set incomplete: missing signatures from {missing}")]
    IncompleteWitnessSet { missing: String },

    #[error("Transaction review rejected: {0}")]
    ReviewRejected(String),

    #[error("Stale transaction: state input {input} is no longer unspent")]
    StaleTransaction { input: String },

    #[error("Fee estimation did not converge after {iterations} iterations")]
    FeeEstimationFailed { iterations: u32 },

    #[error("Submission rejected by the ledger: {reason}")]
    Rejected { reason: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OracleError {
    /// Check if the identical operation may be retried without rebuilding.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OracleError::NetworkError(_) | OracleError::Timeout { .. }
        )
    }

    /// Check if the flow must restart from a fresh chain snapshot.
    pub fn requires_rebuild(&self) -> bool {
        matches!(
            self,
            OracleError::Rejected { .. }
                | OracleError::StaleTransaction { .. }
                | OracleError::AmbiguousState { .. }
        )
    }

    /// Check if the error indicates engine/validator version skew or a broken
    /// deployment; these must be surfaced and never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OracleError::SchemaMismatch(_) | OracleError::Config(_)
        )
    }
}

/// Result type for coordinator operations
pub type OracleResult<T> = Result<T, OracleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_disjoint() {
        let rejected = OracleError::Rejected {
            reason: "state input spent".into(),
        };
        assert!(rejected.requires_rebuild());
        assert!(!rejected.is_retryable());

        let network = OracleError::NetworkError("connection reset".into());
        assert!(network.is_retryable());
        assert!(!network.requires_rebuild());

        let skew = OracleError::SchemaMismatch("constructor 9".into());
        assert!(skew.is_fatal());
        assert!(!skew.is_retryable());
        assert!(!skew.requires_rebuild());
    }
}
