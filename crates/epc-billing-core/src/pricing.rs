//! Per-postcode lead pricing.
//!
//! Lead prices are owned by the marketplace; billing only needs a lookup from
//! postcode to price when the caller does not supply an explicit amount.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default lead price in pence (£15).
pub const DEFAULT_LEAD_PRICE_PENCE: i64 = 1_500;

/// Supplies the price of a lead for a postcode.
pub trait PricingLookup: Send + Sync {
    /// Price in pence for a lead in `postcode`.
    fn lead_price_pence(&self, postcode: &str) -> i64;
}

/// Flat pricing with per-outward-code overrides.
///
/// Overrides are keyed by the outward code (`"SW1A"` for `"SW1A 1AA"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostcodePricing {
    /// Price used when no override matches.
    pub default_price_pence: i64,

    /// Outward code to price.
    pub overrides: HashMap<String, i64>,
}

impl Default for PostcodePricing {
    fn default() -> Self {
        Self::flat(DEFAULT_LEAD_PRICE_PENCE)
    }
}

impl PostcodePricing {
    /// Pricing with a single flat price.
    #[must_use]
    pub fn flat(default_price_pence: i64) -> Self {
        Self {
            default_price_pence,
            overrides: HashMap::new(),
        }
    }

    /// Add an override for an outward code.
    #[must_use]
    pub fn with_override(mut self, outward_code: &str, price_pence: i64) -> Self {
        self.overrides
            .insert(outward_code.trim().to_ascii_uppercase(), price_pence);
        self
    }
}

impl PricingLookup for PostcodePricing {
    fn lead_price_pence(&self, postcode: &str) -> i64 {
        outward_code(postcode)
            .and_then(|code| self.overrides.get(&code).copied())
            .unwrap_or(self.default_price_pence)
    }
}

/// Extract the outward code from a UK postcode.
///
/// Accepts `"SW1A 1AA"`, `"sw1a1aa"`, or a bare outward code like `"M1"`.
#[must_use]
pub fn outward_code(postcode: &str) -> Option<String> {
    let compact: String = postcode
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();

    if compact.is_empty() {
        return None;
    }

    if let Some((outward, _)) = postcode.trim().split_once(' ') {
        return Some(outward.to_ascii_uppercase());
    }

    // Full postcodes always end with a three-character inward code.
    if compact.len() > 4 {
        return Some(compact[..compact.len() - 3].to_string());
    }

    Some(compact)
}
