//! Brevo contact upsert.
//!
//! `POST https://api.brevo.com/v3/contacts` with `updateEnabled: true` creates
//! the contact or updates the existing one with the same email.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use crate::config::BrevoConfig;
use crate::pipeline::{BoxError, CrmConnector, CrmContact};

const BASE_URL: &str = "https://api.brevo.com/v3";

/// Errors that can occur when interacting with the Brevo API.
#[derive(Debug, Error)]
pub enum BrevoError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Unauthorized: invalid API key")]
    Unauthorized,

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Brevo API client.
#[derive(Clone)]
pub struct BrevoClient {
    inner: Arc<BrevoClientInner>,
}

struct BrevoClientInner {
    client: reqwest::Client,
    list_id: Option<i64>,
}

impl BrevoClient {
    /// Create a new Brevo API client.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &BrevoConfig, timeout: Duration) -> Result<Self, BrevoError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "api-key",
            HeaderValue::from_str(config.api_key.expose_secret())
                .map_err(|e| BrevoError::Parse(format!("Invalid API key format: {e}")))?,
        );
        headers.insert("Accept", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(BrevoClientInner {
                client,
                list_id: config.list_id,
            }),
        })
    }

    /// Create or update the contact for `contact.email`.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails.
    #[instrument(skip_all, fields(email = %contact.email))]
    pub async fn upsert(&self, contact: &CrmContact) -> Result<(), BrevoError> {
        let url = format!("{BASE_URL}/contacts");
        let body = ContactUpsert::new(contact, self.inner.list_id);

        let response = self.inner.client.post(&url).json(&body).send().await?;
        let status = response.status();

        // 201 on create, 204 on update
        if status.is_success() {
            tracing::debug!(status = status.as_u16(), "Brevo contact upserted");
            return Ok(());
        }

        if status.as_u16() == 401 {
            return Err(BrevoError::Unauthorized);
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(BrevoError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl CrmConnector for BrevoClient {
    async fn upsert_contact(&self, contact: &CrmContact) -> Result<(), BoxError> {
        Ok(self.upsert(contact).await?)
    }
}

impl std::fmt::Debug for BrevoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrevoClient")
            .field("list_id", &self.inner.list_id)
            .finish_non_exhaustive()
    }
}

/// Body of `POST /contacts`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContactUpsert<'a> {
    email: &'a str,
    update_enabled: bool,
    attributes: ContactAttributes<'a>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    list_ids: Vec<i64>,
}

/// Brevo attribute names are uppercase by convention.
#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct ContactAttributes<'a> {
    #[serde(rename = "FIRSTNAME", skip_serializing_if = "Option::is_none")]
    first_name: Option<&'a str>,
    #[serde(rename = "LASTNAME", skip_serializing_if = "Option::is_none")]
    last_name: Option<&'a str>,
    #[serde(rename = "SMS", skip_serializing_if = "Option::is_none")]
    sms: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_order_id: Option<&'a str>,
    last_order_amount: f64,
    last_order_date: String,
}

impl<'a> ContactUpsert<'a> {
    fn new(contact: &'a CrmContact, list_id: Option<i64>) -> Self {
        use rust_decimal::prelude::ToPrimitive;

        Self {
            email: contact.email.as_str(),
            update_enabled: true,
            attributes: ContactAttributes {
                first_name: contact.first_name.as_deref(),
                last_name: contact.last_name.as_deref(),
                sms: contact.phone.as_deref(),
                last_order_id: contact.last_order_number.as_deref(),
                last_order_amount: contact.last_order_amount.to_f64().unwrap_or_default(),
                last_order_date: contact.last_order_date.format("%Y-%m-%d").to_string(),
            },
            list_ids: list_id.into_iter().collect(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use dropline_core::{Currency, Email};
    use rust_decimal::Decimal;

    use super::*;

    fn contact() -> CrmContact {
        CrmContact {
            email: Email::parse("ada@example.com").unwrap(),
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            phone: None,
            last_order_number: Some("DL-261018-ABC123".to_string()),
            last_order_amount: Decimal::new(4990, 2),
            currency: Currency::usd(),
            last_order_date: Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_contact_upsert_body() {
        let contact = contact();
        let body = serde_json::to_value(ContactUpsert::new(&contact, Some(7))).unwrap();

        assert_eq!(body["email"], "ada@example.com");
        assert_eq!(body["updateEnabled"], true);
        assert_eq!(body["listIds"], serde_json::json!([7]));

        let attributes = &body["attributes"];
        assert_eq!(attributes["FIRSTNAME"], "Ada");
        assert_eq!(attributes["LASTNAME"], "Lovelace");
        assert!(attributes.get("SMS").is_none());
        assert_eq!(attributes["LAST_ORDER_ID"], "DL-261018-ABC123");
        assert_eq!(attributes["LAST_ORDER_AMOUNT"], 49.9);
        assert_eq!(attributes["LAST_ORDER_DATE"], "2026-10-18");
    }

    #[test]
    fn test_contact_upsert_without_list() {
        let contact = contact();
        let body = serde_json::to_value(ContactUpsert::new(&contact, None)).unwrap();
        assert!(body.get("listIds").is_none());
    }
}
