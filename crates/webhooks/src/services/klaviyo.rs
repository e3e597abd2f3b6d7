//! Klaviyo API client for post-purchase profile updates.
//!
//! # API Reference
//!
//! - Base URL: `https://a.klaviyo.com/api`
//! - Authentication: Private API key via `Authorization: Klaviyo-API-Key <key>`
//! - API Version: `2024-10-15` (specified via `revision` header)
//! - `POST /profile-import` creates or updates a profile keyed by email

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use crate::config::KlaviyoConfig;
use crate::pipeline::{BoxError, CrmConnector, CrmContact};

/// Klaviyo API version (revision header).
const API_REVISION: &str = "2024-10-15";

/// Klaviyo API base URL.
const BASE_URL: &str = "https://a.klaviyo.com/api";

/// Errors that can occur when interacting with Klaviyo API.
#[derive(Debug, Error)]
pub enum KlaviyoError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Rate limited by Klaviyo.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Failed to build the request.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Unauthorized (invalid API key).
    #[error("Unauthorized: invalid API key")]
    Unauthorized,
}

/// Klaviyo API client.
#[derive(Clone)]
pub struct KlaviyoClient {
    inner: Arc<KlaviyoClientInner>,
}

struct KlaviyoClientInner {
    client: reqwest::Client,
}

impl KlaviyoClient {
    /// Create a new Klaviyo API client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &KlaviyoConfig, timeout: Duration) -> Result<Self, KlaviyoError> {
        let mut headers = HeaderMap::new();

        let auth_value = format!("Klaviyo-API-Key {}", config.api_key.expose_secret());
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&auth_value)
                .map_err(|e| KlaviyoError::Parse(format!("Invalid API key format: {e}")))?,
        );
        headers.insert("revision", HeaderValue::from_static(API_REVISION));
        headers.insert(
            "Content-Type",
            HeaderValue::from_static("application/vnd.api+json"),
        );
        headers.insert(
            "Accept",
            HeaderValue::from_static("application/vnd.api+json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(KlaviyoClientInner { client }),
        })
    }

    /// Create or update the profile for `contact.email`.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails.
    #[instrument(skip_all, fields(email = %contact.email))]
    pub async fn import_profile(&self, contact: &CrmContact) -> Result<(), KlaviyoError> {
        let url = format!("{BASE_URL}/profile-import");
        let body = ProfileImport::from_contact(contact);

        let response = self.inner.client.post(&url).json(&body).send().await?;
        if response.status().is_success() {
            tracing::debug!("Klaviyo profile imported");
            return Ok(());
        }

        Err(parse_error(response).await)
    }
}

/// Parse error response from Klaviyo API.
async fn parse_error(response: reqwest::Response) -> KlaviyoError {
    let status = response.status().as_u16();

    if status == 429 {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);
        return KlaviyoError::RateLimited(retry_after);
    }

    if status == 401 || status == 403 {
        return KlaviyoError::Unauthorized;
    }

    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    KlaviyoError::Api { status, message }
}

#[async_trait]
impl CrmConnector for KlaviyoClient {
    async fn upsert_contact(&self, contact: &CrmContact) -> Result<(), BoxError> {
        Ok(self.import_profile(contact).await?)
    }
}

impl std::fmt::Debug for KlaviyoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KlaviyoClient").finish_non_exhaustive()
    }
}

// =============================================================================
// Request Types
// =============================================================================

/// JSON:API document for `POST /profile-import`.
#[derive(Debug, Serialize)]
struct ProfileImport<'a> {
    data: ProfileResource<'a>,
}

#[derive(Debug, Serialize)]
struct ProfileResource<'a> {
    #[serde(rename = "type")]
    resource_type: &'static str,
    attributes: ProfileAttributes<'a>,
}

#[derive(Debug, Serialize)]
struct ProfileAttributes<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone_number: Option<&'a str>,
    properties: ProfileProperties<'a>,
}

#[derive(Debug, Serialize)]
struct ProfileProperties<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    last_order_id: Option<&'a str>,
    last_order_amount: String,
    last_order_currency: &'a str,
    last_order_date: String,
}

impl<'a> ProfileImport<'a> {
    fn from_contact(contact: &'a CrmContact) -> Self {
        Self {
            data: ProfileResource {
                resource_type: "profile",
                attributes: ProfileAttributes {
                    email: contact.email.as_str(),
                    first_name: contact.first_name.as_deref(),
                    last_name: contact.last_name.as_deref(),
                    phone_number: contact.phone.as_deref(),
                    properties: ProfileProperties {
                        last_order_id: contact.last_order_number.as_deref(),
                        last_order_amount: contact.last_order_amount.to_string(),
                        last_order_currency: contact.currency.code(),
                        last_order_date: contact.last_order_date.to_rfc3339(),
                    },
                },
            },
        }
    }
}
