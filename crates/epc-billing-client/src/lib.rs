//! EPC Billing Client SDK.
//!
//! Used by lead assignment to charge delivered leads and to check whether an
//! assessor can take more leads before assigning one.
//!
//! # Example
//!
//! ```no_run
//! use epc_billing_client::{EpcBillingClient, LeadCharge};
//!
//! # async fn example() -> Result<(), epc_billing_client::ClientError> {
//! let client = EpcBillingClient::new(
//!     "http://epc-billing.billing.svc:8080",
//!     "your-service-api-key",
//! )?;
//!
//! let assessor_id: epc_billing_core::AssessorId =
//!     "6f1c2b9e-3f0a-4a53-9a63-3c1f6a0d2b11".parse().unwrap();
//!
//! let status = client.get_billing_summary(&assessor_id).await?;
//! if !status.account_paused && !status.billing_blocked {
//!     let receipt = client
//!         .record_lead_charge(LeadCharge {
//!             assessor_id,
//!             lead_id: "lead-123".to_string(),
//!             postcode: "SW1A 1AA".to_string(),
//!             amount_pence: None,
//!         })
//!         .await?;
//!     println!("Charged {}", receipt.amount_formatted);
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{ClientOptions, EpcBillingClient};
pub use error::ClientError;
pub use types::*;
