//! EPC billing HTTP client implementation.

use reqwest::Client;
use std::time::Duration;

use epc_billing_core::AssessorId;

use crate::error::ClientError;
use crate::types::{ApiErrorResponse, BillingSummary, LeadCharge, LeadChargeReceipt};

/// EPC billing API client for lead assignment services.
#[derive(Debug, Clone)]
pub struct EpcBillingClient {
    client: Client,
    base_url: String,
    api_key: String,
    service_name: String,
}

impl EpcBillingClient {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the billing service (e.g., `"http://epc-billing:8080"`)
    /// * `api_key` - Service API key for authentication
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ClientError> {
        Self::with_options(base_url, api_key, ClientOptions::default())
    }

    /// Create a new client with custom options.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the HTTP client cannot be built.
    pub fn with_options(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .map_err(|e| ClientError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            service_name: options.service_name,
        })
    }

    /// Charge a delivered lead to an assessor.
    ///
    /// # Errors
    ///
    /// Returns `AccountPaused`, `BillingBlocked`, `DuplicateLeadCharge`,
    /// `AssessorNotFound`, `InvalidAmount`, or another error if the request
    /// fails.
    pub async fn record_lead_charge(
        &self,
        charge: LeadCharge,
    ) -> Result<LeadChargeReceipt, ClientError> {
        let url = format!("{}/v1/leads/charges", self.base_url);

        tracing::debug!(
            assessor_id = %charge.assessor_id,
            lead_id = %charge.lead_id,
            "Recording lead charge"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("x-service-name", &self.service_name)
            .json(&charge)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get an assessor's billing state before assigning a lead.
    ///
    /// # Errors
    ///
    /// Returns `AssessorNotFound`, or another error if the request fails.
    pub async fn get_billing_summary(
        &self,
        assessor_id: &AssessorId,
    ) -> Result<BillingSummary, ClientError> {
        let url = format!("{}/v1/assessors/{assessor_id}/billing", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .header("x-service-name", &self.service_name)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Whether an assessor can be assigned another lead right now.
    ///
    /// # Errors
    ///
    /// Returns an error if the billing summary cannot be fetched.
    pub async fn can_receive_leads(&self, assessor_id: &AssessorId) -> Result<bool, ClientError> {
        let summary = self.get_billing_summary(assessor_id).await?;
        Ok(!summary.account_paused && !summary.billing_blocked)
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let error_body: Result<ApiErrorResponse, _> = response.json().await;

        match error_body {
            Ok(api_error) => {
                let code = api_error.error.code.as_str();
                let message = api_error.error.message;
                let detail = |key: &str| {
                    api_error
                        .error
                        .details
                        .as_ref()
                        .and_then(|d| d.get(key))
                        .cloned()
                };
                let detail_str = |key: &str| {
                    detail(key)
                        .and_then(|v| v.as_str().map(String::from))
                        .unwrap_or_default()
                };

                match code {
                    "account_paused" => Err(ClientError::AccountPaused {
                        assessor_id: detail_str("assessor_id"),
                    }),
                    "billing_blocked" => Err(ClientError::BillingBlocked {
                        assessor_id: detail_str("assessor_id"),
                        outstanding: detail("outstanding_invoices")
                            .and_then(|v| v.as_u64())
                            .unwrap_or(0),
                    }),
                    "duplicate_lead_charge" => Err(ClientError::DuplicateLeadCharge {
                        lead_id: detail_str("lead_id"),
                    }),
                    "assessor_not_found" => Err(ClientError::AssessorNotFound { message }),
                    "invalid_amount" => Err(ClientError::InvalidAmount(message)),
                    _ => Err(ClientError::Api {
                        code: code.to_string(),
                        message,
                        status: status.as_u16(),
                    }),
                }
            }
            Err(_) => Err(ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            }),
        }
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 10).
    pub timeout_seconds: u64,
    /// Service name to include in requests.
    pub service_name: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            service_name: "unknown".to_string(),
        }
    }
}

impl ClientOptions {
    /// Create options with a service name.
    #[must_use]
    pub fn with_service_name(name: impl Into<String>) -> Self {
        Self {
            service_name: name.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_trims_trailing_slash() {
        let client = EpcBillingClient::new("http://localhost:8080/", "test-api-key").unwrap();
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[test]
    fn client_options() {
        let options = ClientOptions::with_service_name("lead-assignment");
        let client =
            EpcBillingClient::with_options("http://localhost:8080", "key", options).unwrap();
        assert_eq!(client.service_name, "lead-assignment");
    }
}
