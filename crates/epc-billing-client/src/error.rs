//! Client error types.

/// Errors that can occur when using the EPC billing client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an error response.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
        /// HTTP status code.
        status: u16,
    },

    /// The assessor paused lead purchasing.
    #[error("account paused: {assessor_id}")]
    AccountPaused {
        /// The assessor ID.
        assessor_id: String,
    },

    /// Outstanding invoices block new charges.
    #[error("billing blocked: {assessor_id} has {outstanding} outstanding invoices")]
    BillingBlocked {
        /// The assessor ID.
        assessor_id: String,
        /// Outstanding invoice count.
        outstanding: u64,
    },

    /// The lead was already charged.
    #[error("duplicate lead charge: {lead_id}")]
    DuplicateLeadCharge {
        /// The lead ID.
        lead_id: String,
    },

    /// The assessor is not registered with billing.
    #[error("assessor not found: {message}")]
    AssessorNotFound {
        /// Server message.
        message: String,
    },

    /// The charge amount was rejected.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}
