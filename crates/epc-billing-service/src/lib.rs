//! EPC lead billing HTTP API service.
//!
//! This crate provides the HTTP API for assessor lead billing, including:
//!
//! - Lead charge ingestion from lead assignment
//! - Assessor billing summaries, pause/resume and spending limits
//! - Invoice payment, failure and dispute handling
//! - Credit notes and trust level overrides for billing admins
//! - The background period-end sweep
//!
//! # Authentication
//!
//! 1. **Assessor JWTs** (HS256) - dashboard requests
//! 2. **Service API keys** - lead assignment
//! 3. **Admin API key** - billing admins

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers are async for the router even when they don't await

pub mod auth;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod sweep;

pub use config::ServiceConfig;
pub use engine::BillingEngine;
pub use error::ApiError;
pub use gateway::{GatewayError, PaymentGateway, StripeGateway};
pub use routes::create_router;
pub use state::AppState;
pub use sweep::spawn_sweeper;
