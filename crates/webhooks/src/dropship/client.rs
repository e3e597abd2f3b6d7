//! HTTP client for order submission.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use dropline_core::{FulfillmentReceipt, FulfillmentRequest};

use super::DropshipError;
use crate::config::DropshipConfig;
use crate::pipeline::{BoxError, FulfillmentProvider};

const CREATE_ORDER_PATH: &str = "shopping/order/createOrderV2";

/// Success code inside the response envelope.
const SUCCESS_CODE: i64 = 200;

/// Dropshipping API client.
#[derive(Clone)]
pub struct DropshipClient {
    inner: Arc<DropshipClientInner>,
}

struct DropshipClientInner {
    client: reqwest::Client,
    create_order_url: String,
    logistic_name: Option<String>,
}

impl std::fmt::Debug for DropshipClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DropshipClient")
            .field("create_order_url", &self.inner.create_order_url)
            .field("logistic_name", &self.inner.logistic_name)
            .finish_non_exhaustive()
    }
}

impl DropshipClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns error if the access token is not a valid header value or the
    /// HTTP client fails to build.
    pub fn new(config: &DropshipConfig, timeout: Duration) -> Result<Self, DropshipError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "CJ-Access-Token",
            HeaderValue::from_str(config.access_token.expose_secret())
                .map_err(|e| DropshipError::Parse(format!("Invalid access token format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        let base = config.api_url.as_str().trim_end_matches('/');

        Ok(Self {
            inner: Arc::new(DropshipClientInner {
                client,
                create_order_url: format!("{base}/{CREATE_ORDER_PATH}"),
                logistic_name: config.logistic_name.clone(),
            }),
        })
    }

    /// Submit a paid order for fulfillment.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails, the provider rejects the order, or
    /// the response carries no order id.
    #[instrument(skip_all, fields(order_number = %request.order_number, lines = request.lines.len()))]
    pub async fn create_order(
        &self,
        request: &FulfillmentRequest,
    ) -> Result<FulfillmentReceipt, DropshipError> {
        let body = CreateOrder::new(request, self.inner.logistic_name.as_deref());

        let response = self
            .inner
            .client
            .post(&self.inner.create_order_url)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(DropshipError::RateLimited);
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(DropshipError::Unauthorized);
        }
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DropshipError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| DropshipError::Parse(format!("Failed to parse response: {e}")))?;

        envelope.into_receipt()
    }
}

#[async_trait]
impl FulfillmentProvider for DropshipClient {
    async fn submit_order(
        &self,
        request: &FulfillmentRequest,
    ) -> Result<FulfillmentReceipt, BoxError> {
        Ok(self.create_order(request).await?)
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrder<'a> {
    order_number: &'a str,
    shipping_customer_name: &'a str,
    shipping_address: String,
    shipping_city: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    shipping_province: Option<&'a str>,
    shipping_country_code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    shipping_zip: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    shipping_phone: Option<&'a str>,
    email: &'a str,
    remark: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    logistic_name: Option<&'a str>,
    products: Vec<CreateOrderProduct<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderProduct<'a> {
    vid: &'a str,
    quantity: i32,
    store_line_item_id: &'a str,
}

impl<'a> CreateOrder<'a> {
    fn new(request: &'a FulfillmentRequest, logistic_name: Option<&'a str>) -> Self {
        let shipping = &request.shipping;
        Self {
            order_number: &request.order_number,
            shipping_customer_name: &shipping.name,
            shipping_address: shipping.street(),
            shipping_city: &shipping.city,
            shipping_province: shipping.region.as_deref(),
            shipping_country_code: &shipping.country,
            shipping_zip: shipping.postal_code.as_deref(),
            shipping_phone: shipping.phone.as_deref(),
            email: request.email.as_str(),
            remark: &request.remark,
            logistic_name,
            products: request
                .lines
                .iter()
                .map(|line| CreateOrderProduct {
                    vid: &line.variant_id,
                    quantity: line.quantity,
                    store_line_item_id: &line.line_reference_id,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    result: bool,
    message: Option<String>,
    data: Option<CreatedOrder>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedOrder {
    order_id: Option<String>,
    order_number: Option<String>,
}

impl Envelope {
    fn into_receipt(self) -> Result<FulfillmentReceipt, DropshipError> {
        if !self.result || self.code != SUCCESS_CODE {
            return Err(DropshipError::Rejected {
                code: self.code,
                message: self.message.unwrap_or_default(),
            });
        }

        let data = self
            .data
            .ok_or_else(|| DropshipError::Parse("response has no data".to_string()))?;
        let external_order_id = data
            .order_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| DropshipError::Parse("response has no orderId".to_string()))?;

        Ok(FulfillmentReceipt {
            external_order_id,
            external_order_number: data.order_number,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use dropline_core::{Email, FulfillmentLine, ShippingAddress};

    use super::*;

    fn request() -> FulfillmentRequest {
        FulfillmentRequest {
            order_number: "DL-261018-ABC123".to_string(),
            shipping: ShippingAddress {
                name: "Ada Lovelace".to_string(),
                line1: "1 Main St".to_string(),
                line2: Some("Apt 2".to_string()),
                city: "Springfield".to_string(),
                region: Some("IL".to_string()),
                country: "US".to_string(),
                postal_code: Some("62701".to_string()),
                phone: None,
            },
            email: Email::parse("ada@example.com").unwrap(),
            remark: "Order DL-261018-ABC123".to_string(),
            lines: vec![FulfillmentLine {
                variant_id: "v-1".to_string(),
                quantity: 2,
                line_reference_id: "17".to_string(),
            }],
        }
    }

    #[test]
    fn test_create_order_body() {
        let request = request();
        let body = serde_json::to_value(CreateOrder::new(&request, Some("CJPacket"))).unwrap();

        assert_eq!(body["orderNumber"], "DL-261018-ABC123");
        assert_eq!(body["shippingCustomerName"], "Ada Lovelace");
        assert_eq!(body["shippingAddress"], request.shipping.street());
        assert_eq!(body["shippingCity"], "Springfield");
        assert_eq!(body["shippingProvince"], "IL");
        assert_eq!(body["shippingCountryCode"], "US");
        assert_eq!(body["shippingZip"], "62701");
        assert!(body.get("shippingPhone").is_none());
        assert_eq!(body["email"], "ada@example.com");
        assert_eq!(body["logisticName"], "CJPacket");
        assert_eq!(
            body["products"],
            serde_json::json!([{ "vid": "v-1", "quantity": 2, "storeLineItemId": "17" }])
        );
    }

    #[test]
    fn test_envelope_success() {
        let envelope: Envelope = serde_json::from_str(
            r#"{"code":200,"result":true,"message":"Success","data":{"orderId":"2103","orderNumber":"CJ-9"}}"#,
        )
        .unwrap();
        let receipt = envelope.into_receipt().unwrap();
        assert_eq!(receipt.external_order_id, "2103");
        assert_eq!(receipt.external_order_number.as_deref(), Some("CJ-9"));
    }

    #[test]
    fn test_envelope_rejected() {
        let envelope: Envelope = serde_json::from_str(
            r#"{"code":1600100,"result":false,"message":"variant not found","data":null}"#,
        )
        .unwrap();
        assert!(matches!(
            envelope.into_receipt(),
            Err(DropshipError::Rejected { code: 1_600_100, .. })
        ));
    }

    #[test]
    fn test_envelope_missing_order_id() {
        let envelope: Envelope =
            serde_json::from_str(r#"{"code":200,"result":true,"data":{}}"#).unwrap();
        assert!(matches!(
            envelope.into_receipt(),
            Err(DropshipError::Parse(_))
        ));
    }
}
