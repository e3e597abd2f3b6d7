//! Stripe event payloads.
//!
//! Wire types mirror the provider JSON and never leave this module;
//! [`parse_event`] converts them into [`ReceivedEvent`].

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Deserialize;

use dropline_core::{
    CheckoutSession, Currency, CustomerContact, Email, LineItem, Money, PaymentEvent,
    PaymentIntent, ReceivedEvent, ShippingAddress,
};

use super::VerifyError;

const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
const PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";

/// Generic webhook envelope; `object` is parsed based on `event_type`.
#[derive(Debug, Deserialize)]
struct StripeEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: serde_json::Value,
}

// ============ checkout.session.completed ============

#[derive(Debug, Deserialize)]
struct StripeCheckoutSession {
    id: String,
    customer_details: Option<StripeCustomerDetails>,
    customer_email: Option<String>,
    amount_total: Option<i64>,
    currency: Option<String>,
    shipping_details: Option<StripeShippingDetails>,
    collected_information: Option<StripeCollectedInformation>,
    line_items: Option<StripeList<StripeLineItem>>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct StripeCustomerDetails {
    email: Option<String>,
    name: Option<String>,
    phone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeCollectedInformation {
    shipping_details: Option<StripeShippingDetails>,
}

#[derive(Debug, Deserialize)]
struct StripeShippingDetails {
    name: Option<String>,
    phone: Option<String>,
    address: Option<StripeAddress>,
}

#[derive(Debug, Deserialize)]
struct StripeAddress {
    line1: Option<String>,
    line2: Option<String>,
    city: Option<String>,
    state: Option<String>,
    country: Option<String>,
    postal_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeList<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct StripeLineItem {
    description: Option<String>,
    quantity: Option<i32>,
    price: Option<StripePrice>,
}

#[derive(Debug, Deserialize)]
struct StripePrice {
    id: String,
    unit_amount: Option<i64>,
    lookup_key: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// Line item encoded in `metadata.items` by the storefront checkout.
#[derive(Debug, Deserialize)]
struct MetadataItem {
    sku: String,
    name: Option<String>,
    #[serde(alias = "qty", default = "one")]
    quantity: i32,
    #[serde(alias = "price", default)]
    unit_price: Decimal,
    #[serde(alias = "vid")]
    variant_id: Option<String>,
}

const fn one() -> i32 {
    1
}

// ============ payment_intent.succeeded ============

#[derive(Debug, Deserialize)]
struct StripePaymentIntent {
    id: String,
    amount_received: Option<i64>,
    amount: Option<i64>,
    currency: Option<String>,
}

/// Parse a raw payload into a typed event.
///
/// # Errors
///
/// Returns `VerifyError::MalformedPayload` if the payload is not a JSON event
/// envelope, or if a recognised event type carries an invalid object.
pub fn parse_event(payload: &[u8]) -> Result<ReceivedEvent, VerifyError> {
    let envelope: StripeEvent = serde_json::from_slice(payload)
        .map_err(|e| VerifyError::MalformedPayload(e.to_string()))?;

    let event = match envelope.event_type.as_str() {
        CHECKOUT_COMPLETED => {
            let session: StripeCheckoutSession = serde_json::from_value(envelope.data.object)
                .map_err(|e| VerifyError::MalformedPayload(format!("checkout session: {e}")))?;
            PaymentEvent::CheckoutCompleted(session.into_domain())
        }
        PAYMENT_SUCCEEDED => {
            let intent: StripePaymentIntent = serde_json::from_value(envelope.data.object)
                .map_err(|e| VerifyError::MalformedPayload(format!("payment intent: {e}")))?;
            let currency = parse_currency(intent.currency.as_deref());
            let units = intent.amount_received.or(intent.amount).unwrap_or(0);
            PaymentEvent::PaymentSucceeded(PaymentIntent {
                id: intent.id,
                amount: Money::from_minor_units(units, currency),
            })
        }
        other => PaymentEvent::Unknown {
            event_type: other.to_string(),
        },
    };

    Ok(ReceivedEvent {
        id: envelope.id,
        event,
    })
}

fn parse_currency(code: Option<&str>) -> Currency {
    code.and_then(|c| Currency::parse(c).ok())
        .unwrap_or_else(Currency::usd)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl StripeCheckoutSession {
    fn into_domain(self) -> CheckoutSession {
        let currency = parse_currency(self.currency.as_deref());
        let amount_total = Money::from_minor_units(self.amount_total.unwrap_or(0), currency.clone());

        let (email, name, phone) = match self.customer_details {
            Some(details) => (details.email, details.name, details.phone),
            None => (None, None, None),
        };
        let email = non_blank(email)
            .or_else(|| non_blank(self.customer_email))
            .and_then(|raw| match Email::parse(&raw) {
                Ok(email) => Some(email),
                Err(e) => {
                    tracing::warn!(error = %e, "Checkout session carries an invalid email");
                    None
                }
            });
        let customer = CustomerContact {
            email,
            name: non_blank(name),
            phone: non_blank(phone),
        };

        let shipping = self
            .shipping_details
            .or_else(|| self.collected_information.and_then(|c| c.shipping_details))
            .and_then(|details| shipping_address(details, &customer));

        let mut line_items = self
            .line_items
            .map(|list| expanded_line_items(list.data, &currency))
            .unwrap_or_default();
        if line_items.is_empty() {
            line_items = metadata_line_items(&self.metadata);
        }

        CheckoutSession {
            session_id: self.id,
            customer,
            amount_total,
            line_items,
            shipping,
        }
    }
}

/// A shippable address needs a street, a city and a country.
fn shipping_address(
    details: StripeShippingDetails,
    customer: &CustomerContact,
) -> Option<ShippingAddress> {
    let address = details.address?;
    Some(ShippingAddress {
        name: non_blank(details.name)
            .or_else(|| customer.name.clone())
            .unwrap_or_default(),
        line1: non_blank(address.line1)?,
        line2: non_blank(address.line2),
        city: non_blank(address.city)?,
        region: non_blank(address.state),
        country: non_blank(address.country)?.to_ascii_uppercase(),
        postal_code: non_blank(address.postal_code),
        phone: non_blank(details.phone).or_else(|| customer.phone.clone()),
    })
}

fn expanded_line_items(items: Vec<StripeLineItem>, currency: &Currency) -> Vec<LineItem> {
    items
        .into_iter()
        .filter_map(|item| {
            let price = item.price?;
            let quantity = item.quantity.unwrap_or(1);
            if quantity <= 0 {
                return None;
            }
            let sku = non_blank(price.metadata.get("sku").cloned())
                .or_else(|| non_blank(price.lookup_key.clone()))
                .unwrap_or_else(|| price.id.clone());
            let unit_price = price
                .unit_amount
                .map(|units| Money::from_minor_units(units, currency.clone()).amount)
                .unwrap_or_default();
            Some(LineItem {
                sku,
                name: non_blank(item.description),
                quantity,
                unit_price,
                variant_id: non_blank(price.metadata.get("variant_id").cloned()),
            })
        })
        .collect()
}

fn metadata_line_items(metadata: &HashMap<String, String>) -> Vec<LineItem> {
    let Some(raw) = metadata.get("items") else {
        return Vec::new();
    };

    match serde_json::from_str::<Vec<MetadataItem>>(raw) {
        Ok(items) => items
            .into_iter()
            .filter(|item| item.quantity > 0 && !item.sku.trim().is_empty())
            .map(|item| LineItem {
                sku: item.sku.trim().to_string(),
                name: non_blank(item.name),
                quantity: item.quantity,
                unit_price: item.unit_price,
                variant_id: non_blank(item.variant_id),
            })
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring unparseable metadata.items");
            Vec::new()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn checkout(object: &serde_json::Value) -> CheckoutSession {
        let payload = json!({
            "id": "evt_1",
            "type": CHECKOUT_COMPLETED,
            "data": { "object": object },
        });
        match parse_event(payload.to_string().as_bytes()).unwrap().event {
            PaymentEvent::CheckoutCompleted(session) => session,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_checkout_with_metadata_items() {
        let session = checkout(&json!({
            "id": "cs_1",
            "customer_details": { "email": "A@B.com", "name": "Ada Lovelace" },
            "amount_total": 4990,
            "currency": "usd",
            "metadata": {
                "items": r#"[{"sku":"X","qty":2,"price":"24.95","vid":"v-1"}]"#
            }
        }));

        assert_eq!(session.session_id, "cs_1");
        assert_eq!(session.customer.email.unwrap().as_str(), "a@b.com");
        assert_eq!(session.amount_total.amount, Decimal::new(4990, 2));
        assert_eq!(session.line_items.len(), 1);
        let item = &session.line_items[0];
        assert_eq!(item.sku, "X");
        assert_eq!(item.quantity, 2);
        assert_eq!(item.unit_price, Decimal::new(2495, 2));
        assert_eq!(item.variant_id.as_deref(), Some("v-1"));
    }

    #[test]
    fn test_checkout_with_expanded_line_items() {
        let session = checkout(&json!({
            "id": "cs_2",
            "customer_email": "buyer@shop.test",
            "amount_total": 3000,
            "currency": "eur",
            "line_items": { "data": [
                {
                    "description": "Mug",
                    "quantity": 3,
                    "price": { "id": "price_1", "unit_amount": 1000, "metadata": { "sku": "MUG" } }
                },
                {
                    "description": "Sticker",
                    "quantity": 1,
                    "price": { "id": "price_2", "unit_amount": 0, "lookup_key": "STK" }
                }
            ]}
        }));

        assert_eq!(session.customer.email.unwrap().as_str(), "buyer@shop.test");
        let skus: Vec<&str> = session.line_items.iter().map(|i| i.sku.as_str()).collect();
        assert_eq!(skus, ["MUG", "STK"]);
        assert_eq!(session.line_items[0].unit_price, Decimal::new(1000, 2));
        assert_eq!(session.line_items[0].name.as_deref(), Some("Mug"));
    }

    #[test]
    fn test_checkout_zero_decimal_currency() {
        let session = checkout(&json!({
            "id": "cs_3",
            "amount_total": 1500,
            "currency": "jpy"
        }));
        assert_eq!(session.amount_total.amount, Decimal::from(1500));
        assert_eq!(session.amount_total.currency.code(), "JPY");
    }

    #[test]
    fn test_checkout_invalid_email_is_dropped() {
        let session = checkout(&json!({
            "id": "cs_4",
            "customer_details": { "email": "not-an-email" },
            "amount_total": 100,
            "currency": "usd"
        }));
        assert!(session.customer.email.is_none());
    }

    #[test]
    fn test_shipping_from_collected_information() {
        let session = checkout(&json!({
            "id": "cs_5",
            "customer_details": { "email": "a@b.com", "name": "Ada Lovelace", "phone": "+15550100" },
            "amount_total": 100,
            "currency": "usd",
            "collected_information": { "shipping_details": {
                "address": {
                    "line1": "1 Main St", "city": "Springfield", "state": "IL",
                    "country": "us", "postal_code": "62701"
                }
            }}
        }));

        let shipping = session.shipping.unwrap();
        assert_eq!(shipping.name, "Ada Lovelace");
        assert_eq!(shipping.country, "US");
        assert_eq!(shipping.phone.as_deref(), Some("+15550100"));
    }

    #[test]
    fn test_incomplete_shipping_address_is_none() {
        let session = checkout(&json!({
            "id": "cs_6",
            "amount_total": 100,
            "currency": "usd",
            "shipping_details": { "name": "Ada", "address": { "line1": "1 Main St" } }
        }));
        assert!(session.shipping.is_none());
    }

    #[test]
    fn test_unparseable_metadata_items_ignored() {
        let session = checkout(&json!({
            "id": "cs_7",
            "amount_total": 100,
            "currency": "usd",
            "metadata": { "items": "not json" }
        }));
        assert!(session.line_items.is_empty());
    }

    #[test]
    fn test_payment_intent_succeeded() {
        let payload = json!({
            "id": "evt_2",
            "type": PAYMENT_SUCCEEDED,
            "data": { "object": { "id": "pi_1", "amount_received": 4990, "currency": "usd" } }
        });
        let event = parse_event(payload.to_string().as_bytes()).unwrap();
        match event.event {
            PaymentEvent::PaymentSucceeded(intent) => {
                assert_eq!(intent.id, "pi_1");
                assert_eq!(intent.amount.formatted(), "$49.90");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_unknown_event_type() {
        let payload = br#"{"id":"evt_3","type":"customer.created","data":{"object":{"id":"cus_1"}}}"#;
        let event = parse_event(payload).unwrap();
        assert_eq!(
            event.event,
            PaymentEvent::Unknown {
                event_type: "customer.created".to_string()
            }
        );
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(matches!(
            parse_event(b"not json"),
            Err(VerifyError::MalformedPayload(_))
        ));
        assert!(matches!(
            parse_event(br#"{"type":"checkout.session.completed"}"#),
            Err(VerifyError::MalformedPayload(_))
        ));
        let missing_session_id =
            br#"{"id":"evt_4","type":"checkout.session.completed","data":{"object":{}}}"#;
        assert!(matches!(
            parse_event(missing_session_id),
            Err(VerifyError::MalformedPayload(_))
        ));
    }
}
