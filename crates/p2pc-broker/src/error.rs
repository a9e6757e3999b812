//! Error types for broker operations.

use thiserror::Error;

/// Result type alias for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Errors that can occur while talking to the marketplace ledger.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The ledger connection is unavailable.
    #[error("connection error during {operation}: {message}")]
    Connection {
        /// Operation that was in progress.
        operation: String,
        /// Transport error description.
        message: String,
    },

    /// No receipt was observed within the confirmation bound.
    ///
    /// The submission may still land; callers must re-read ledger state
    /// before retrying.
    #[error("timeout: {operation} (tx {tx_hash}) not confirmed within {timeout_secs} seconds")]
    Timeout {
        /// Operation that timed out.
        operation: String,
        /// Hash of the submitted transaction.
        tx_hash: String,
        /// Confirmation bound in seconds.
        timeout_secs: u64,
    },

    /// The ledger executed the call and rejected it.
    #[error("execution reverted: {operation} (tx {tx_hash}): {reason}")]
    ExecutionReverted {
        /// Operation that was rejected.
        operation: String,
        /// Hash of the reverted transaction.
        tx_hash: String,
        /// Revert reason reported by the ledger.
        reason: String,
    },

    /// The ledger refused the signed call before executing it.
    #[error("submission rejected: {operation}: {reason}")]
    SubmissionRejected {
        /// Operation that was refused.
        operation: String,
        /// Reason reported by the ledger.
        reason: String,
    },

    /// Query target does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing item.
        what: String,
    },

    /// A value cannot be represented in the ledger's fixed format.
    #[error("encoding error: {message}")]
    Encoding {
        /// Description of the encoding error.
        message: String,
    },

    /// A required precondition does not hold.
    #[error("precondition failed: {message}")]
    Precondition {
        /// Description of the failed precondition.
        message: String,
    },

    /// A ledger response could not be decoded.
    #[error("invalid ledger response for {operation}: {message}")]
    InvalidResponse {
        /// Operation whose response was malformed.
        operation: String,
        /// Decoding error description.
        message: String,
    },

    /// Invalid address format.
    #[error("invalid address: {message}")]
    InvalidAddress {
        /// Description of the address error.
        message: String,
    },

    /// Wallet error.
    #[error("wallet error: {message}")]
    Wallet {
        /// Description of the wallet error.
        message: String,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BrokerError {
    /// Create a connection error.
    #[must_use]
    pub fn connection(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create an execution reverted error.
    #[must_use]
    pub fn reverted(
        operation: impl Into<String>,
        tx_hash: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ExecutionReverted {
            operation: operation.into(),
            tx_hash: tx_hash.into(),
            reason: reason.into(),
        }
    }

    /// Create a submission rejected error.
    #[must_use]
    pub fn rejected(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SubmissionRejected {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create an encoding error.
    #[must_use]
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Create a precondition error.
    #[must_use]
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }

    /// Create an invalid response error.
    #[must_use]
    pub fn invalid_response(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create an invalid address error.
    #[must_use]
    pub fn invalid_address(message: impl Into<String>) -> Self {
        Self::InvalidAddress {
            message: message.into(),
        }
    }

    /// Whether the caller may retry the same operation unchanged.
    ///
    /// Only transport failures qualify. A timeout is not retryable: the
    /// original submission may still be included.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Whether the outcome of a submission is unknown and ledger state must
    /// be re-read before doing anything else.
    #[must_use]
    pub const fn needs_reconciliation(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether this error is a ledger rejection of the executed call.
    #[must_use]
    pub const fn is_reverted(&self) -> bool {
        matches!(self, Self::ExecutionReverted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverted_display_carries_context() {
        let err = BrokerError::reverted("claim_expired(3)", "ab12", "booking not expired");
        let s = err.to_string();
        assert!(s.contains("claim_expired(3)"));
        assert!(s.contains("ab12"));
        assert!(s.contains("booking not expired"));
    }

    #[test]
    fn test_timeout_display() {
        let err = BrokerError::Timeout {
            operation: "book_vm".to_string(),
            tx_hash: "ff00".to_string(),
            timeout_secs: 60,
        };
        assert!(err.to_string().contains("60 seconds"));
        assert!(err.needs_reconciliation());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classification() {
        assert!(BrokerError::connection("query", "refused").is_retryable());
        assert!(BrokerError::reverted("op", "h", "r").is_reverted());
        assert!(!BrokerError::not_found("booking 1").is_retryable());
        assert!(!BrokerError::encoding("too long").needs_reconciliation());
    }
}
