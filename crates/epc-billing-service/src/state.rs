//! Application state.

use std::sync::Arc;

use epc_billing_store::Store;

use crate::config::ServiceConfig;
use crate::engine::BillingEngine;
use crate::gateway::{PaymentGateway, StripeGateway};

/// Application state shared across handlers.
pub struct AppState {
    /// Service configuration.
    pub config: ServiceConfig,

    /// Billing operations over the store.
    pub engine: Arc<BillingEngine>,
}

impl AppState {
    /// Create the state, enabling Stripe collection when an API key is configured.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        let gateway = config.stripe_api_key.as_ref().and_then(|key| {
            match StripeGateway::new(key.clone()) {
                Ok(gateway) => {
                    tracing::info!("Stripe collection enabled");
                    Some(Arc::new(gateway) as Arc<dyn PaymentGateway>)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create Stripe gateway");
                    None
                }
            }
        });

        if gateway.is_none() {
            tracing::warn!("Stripe not configured - invoices will not be auto-charged");
        }

        Self::with_gateway(store, config, gateway)
    }

    /// Create the state with an explicit payment gateway.
    #[must_use]
    pub fn with_gateway(
        store: Arc<dyn Store>,
        config: ServiceConfig,
        gateway: Option<Arc<dyn PaymentGateway>>,
    ) -> Self {
        let engine = BillingEngine::new(
            store,
            config.policy.clone(),
            Arc::new(config.pricing.clone()),
            gateway,
        );

        Self {
            config,
            engine: Arc::new(engine),
        }
    }
}
