/// Error types for account stores and the points ledger.

/// Failure reported by an `AccountStore`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Account not found: {user_id}")]
    NotFound { user_id: String },

    #[error("Account already exists: {user_id}")]
    AlreadyExists { user_id: String },

    /// The stored counters no longer match the ones the write was based on.
    /// `expected` and `actual` are the balances on either side.
    #[error("Account changed concurrently: expected balance {expected}, found {actual}")]
    Conflict { expected: i64, actual: i64 },

    #[error("Backend error: {0:#}")]
    Backend(#[from] anyhow::Error),
}

/// Failure of a ledger operation.
///
/// Every variant is an expected outcome the caller handles; none of them
/// leaves the local account mirror half-updated.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Insufficient points. You need {needed} points but only have {available} points.")]
    InsufficientPoints { needed: u64, available: u64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Another session changed the balance first; the local mirror has been
    /// refreshed to `current`.
    #[error("Balance changed in another session (now {current} points)")]
    StaleBalance { current: u64 },

    #[error("Malformed {entity} record: {reason}")]
    MalformedRecord { entity: &'static str, reason: String },

    #[error("Remote call failed during {operation}")]
    Remote {
        operation: &'static str,
        #[source]
        source: StoreError,
    },
}

impl LedgerError {
    pub(crate) fn remote(operation: &'static str, source: StoreError) -> Self {
        Self::Remote { operation, source }
    }

    pub(crate) fn malformed(entity: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            entity,
            reason: reason.into(),
        }
    }

    /// Whether the UI should steer the user to the purchase flow.
    pub fn needs_purchase(&self) -> bool {
        matches!(self, Self::InsufficientPoints { .. })
    }

    /// Whether a user-triggered retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Remote { .. } | Self::StaleBalance { .. })
    }
}
