//! Dropshipping provider API client.
//!
//! Paid orders are pushed to a CJ-style REST API as one `createOrderV2` call.
//! The provider ships directly to the customer; we only keep its order id.
//!
//! # API Reference
//!
//! - Authentication: `CJ-Access-Token` header
//! - `POST {api_url}/shopping/order/createOrderV2`
//! - Responses use an envelope `{code, result, message, data}`

pub mod client;

pub use client::DropshipClient;

use thiserror::Error;

/// Errors that can occur when submitting orders to the dropshipping provider.
#[derive(Debug, Error)]
pub enum DropshipError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The provider answered but rejected the order.
    #[error("order rejected (code {code}): {message}")]
    Rejected { code: i64, message: String },

    /// Access token rejected.
    #[error("Unauthorized: invalid access token")]
    Unauthorized,

    /// Rate limited by the provider.
    #[error("Rate limited")]
    RateLimited,

    /// Response could not be understood.
    #[error("Parse error: {0}")]
    Parse(String),
}
