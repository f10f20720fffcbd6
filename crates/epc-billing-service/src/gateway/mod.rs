//! Payment collaborator.
//!
//! The billing engine only starts collection for auto-charge invoices.
//! Terminal outcomes come back asynchronously through `POST /webhooks/payments`.

mod stripe;
pub mod types;

use async_trait::async_trait;
use epc_billing_core::Invoice;

pub use stripe::{verify_webhook_signature, StripeGateway, WEBHOOK_TOLERANCE_SECONDS};

/// Error type for payment gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider rejected the request.
    #[error("provider error: {error_type} - {message}")]
    Api {
        /// Error type.
        error_type: String,
        /// Error message.
        message: String,
        /// Error code.
        code: Option<String>,
    },

    /// Invalid webhook signature.
    #[error("invalid webhook signature")]
    InvalidSignature,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result of starting collection for an invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeAttempt {
    /// Whether the provider accepted the charge request.
    pub success: bool,
    /// Provider reference (payment intent ID).
    pub provider_ref: Option<String>,
}

/// Starts collection of invoice amounts.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Ask the provider to collect the invoice's amount due.
    async fn charge_invoice(&self, invoice: &Invoice) -> Result<ChargeAttempt, GatewayError>;
}
