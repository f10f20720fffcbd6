//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post, put};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, billing, health, leads, webhooks};
use crate::state::AppState;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent lead charge requests.
/// Lead assignment reports every delivered lead, so this gets the most traffic.
const LEAD_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent requests for dashboard and admin endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Leads (service API key auth)
/// - `POST /v1/leads/charges` - Charge a delivered lead
/// - `GET /v1/assessors/:id/billing` - Billing status for lead assignment
///
/// ## Assessor self-service (JWT auth)
/// - `GET /v1/billing/me` - Billing summary
/// - `POST /v1/billing/me/pause` / `resume`
/// - `PUT /v1/billing/me/limit` - Select a spending limit
/// - `GET /v1/billing/me/invoices` / `credit-notes`
///
/// ## Admin (admin key auth)
/// - `POST /v1/admin/assessors` - Register an assessor
/// - `GET /v1/admin/assessors/:id` and its `pause`, `resume`, `trust-level`,
///   `invoices`, `credit-notes` sub-routes
/// - `GET /v1/admin/invoices/:id` and its `payments`, `failures`, `dispute`,
///   `resolve`, `credit-notes` sub-routes
/// - `POST /v1/admin/periods/:id/close` - Close a period early
/// - `POST /v1/admin/sweep` - Run the period-end sweep
///
/// ## Webhooks (signature verification)
/// - `POST /webhooks/payments` - Payment outcomes
pub fn create_router(state: AppState) -> Router {
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let lead_routes = Router::new()
        .route("/charges", post(leads::charge_lead))
        .layer(ConcurrencyLimitLayer::new(LEAD_MAX_CONCURRENT_REQUESTS));

    let admin_routes = Router::new()
        // Assessors
        .route("/assessors", post(admin::create_assessor))
        .route("/assessors/:id", get(admin::get_assessor))
        .route("/assessors/:id/pause", post(admin::pause_assessor))
        .route("/assessors/:id/resume", post(admin::resume_assessor))
        .route("/assessors/:id/trust-level", post(admin::set_trust_level))
        .route("/assessors/:id/invoices", get(admin::list_assessor_invoices))
        .route(
            "/assessors/:id/credit-notes",
            get(admin::list_assessor_credit_notes),
        )
        // Invoices
        .route("/invoices/:id", get(admin::get_invoice))
        .route("/invoices/:id/payments", post(admin::record_payment))
        .route("/invoices/:id/failures", post(admin::record_failure))
        .route("/invoices/:id/dispute", post(admin::dispute_invoice))
        .route("/invoices/:id/resolve", post(admin::resolve_dispute))
        .route("/invoices/:id/credit-notes", post(admin::issue_credit))
        // Periods
        .route("/periods/:id/close", post(admin::close_period))
        .route("/sweep", post(admin::run_sweep));

    let api_routes = Router::new()
        .route("/assessors/:id/billing", get(leads::get_assessor_billing))
        .route("/billing/me", get(billing::get_my_billing))
        .route("/billing/me/pause", post(billing::pause_me))
        .route("/billing/me/resume", post(billing::resume_me))
        .route("/billing/me/limit", put(billing::set_my_limit))
        .route("/billing/me/invoices", get(billing::list_my_invoices))
        .route("/billing/me/credit-notes", get(billing::list_my_credit_notes))
        .nest("/admin", admin_routes)
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS))
        .nest("/leads", lead_routes);

    Router::new()
        .route("/health", get(health::health))
        .nest("/v1", api_routes)
        // Webhooks (no rate limit - controlled by the payment provider)
        .route("/webhooks/payments", post(webhooks::payment_webhook))
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
