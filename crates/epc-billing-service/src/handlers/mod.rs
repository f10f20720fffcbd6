//! API handlers.

pub mod admin;
pub mod billing;
pub mod health;
pub mod leads;
pub mod webhooks;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Largest page a list endpoint returns.
const MAX_PAGE_SIZE: usize = 100;

/// Pagination query parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ListParams {
    /// Page size (default 20, max 100).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Items to skip.
    #[serde(default)]
    pub offset: usize,
}

const fn default_limit() -> usize {
    20
}

impl ListParams {
    /// The page size clamped to `1..=100`.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.limit.clamp(1, MAX_PAGE_SIZE)
    }
}

/// A page of results.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    /// Items, newest first.
    pub items: Vec<T>,
    /// Page size used.
    pub limit: usize,
    /// Items skipped.
    pub offset: usize,
}

impl<T> Page<T> {
    fn new(items: Vec<T>, params: ListParams) -> Self {
        Self {
            items,
            limit: params.page_size(),
            offset: params.offset,
        }
    }
}

/// Parse a path identifier.
fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {what}: {raw}")))
}
