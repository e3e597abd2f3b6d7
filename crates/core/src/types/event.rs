//! Verified payment events.
//!
//! A [`PaymentEvent`] is produced exactly once per request by the webhook
//! verifier and is immutable from then on. Downstream code matches on the
//! variant instead of probing optional JSON fields.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::email::Email;
use super::money::Money;

/// SKU used when a checkout carries no itemized lines.
pub const DEFAULT_LINE_ITEM_SKU: &str = "ORDER-TOTAL";

/// Product name snapshot for the default line item.
pub const DEFAULT_LINE_ITEM_NAME: &str = "Order total";

/// A verified event together with the provider's event id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedEvent {
    /// Provider event id (e.g., `evt_...`), used only for logging.
    pub id: String,
    /// The typed event.
    pub event: PaymentEvent,
}

/// Closed set of payment events the pipeline understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    /// A checkout session was paid; drives the fulfillment pipeline.
    CheckoutCompleted(CheckoutSession),
    /// A payment intent succeeded; logged only.
    PaymentSucceeded(PaymentIntent),
    /// Any other event type; acknowledged without action.
    Unknown {
        /// The provider's type tag.
        event_type: String,
    },
}

impl PaymentEvent {
    /// Short tag for log fields.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::CheckoutCompleted(_) => "checkout_completed",
            Self::PaymentSucceeded(_) => "payment_succeeded",
            Self::Unknown { event_type } => event_type,
        }
    }
}

/// A completed checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    /// Provider session id; the idempotency key for order creation.
    pub session_id: String,
    /// Who paid.
    pub customer: CustomerContact,
    /// Total charged.
    pub amount_total: Money,
    /// Itemized lines, possibly empty.
    pub line_items: Vec<LineItem>,
    /// Where to ship, if the checkout collected an address.
    pub shipping: Option<ShippingAddress>,
}

impl CheckoutSession {
    /// Line items to materialize on the order.
    ///
    /// Falls back to a single line for the full amount when the event is not
    /// itemized, so every order has at least one item.
    #[must_use]
    pub fn resolved_line_items(&self) -> Vec<LineItem> {
        if !self.line_items.is_empty() {
            return self.line_items.clone();
        }

        vec![LineItem {
            sku: DEFAULT_LINE_ITEM_SKU.to_string(),
            name: Some(DEFAULT_LINE_ITEM_NAME.to_string()),
            quantity: 1,
            unit_price: self.amount_total.amount,
            variant_id: None,
        }]
    }
}

/// Customer contact details captured at checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerContact {
    /// Normalized email; `None` when absent or unparseable.
    pub email: Option<Email>,
    /// Display name as entered.
    pub name: Option<String>,
    /// Phone number as entered.
    pub phone: Option<String>,
}

/// One purchased line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Catalog SKU.
    pub sku: String,
    /// Product name at time of purchase.
    pub name: Option<String>,
    /// Units purchased (always positive).
    pub quantity: i32,
    /// Price per unit in the session currency.
    pub unit_price: Decimal,
    /// Dropshipping variant carried by the line itself.
    pub variant_id: Option<String>,
}

/// Shipping destination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    /// Recipient name.
    pub name: String,
    /// Street line 1.
    pub line1: String,
    /// Street line 2.
    pub line2: Option<String>,
    /// City.
    pub city: String,
    /// State, province or region.
    pub region: Option<String>,
    /// ISO 3166-1 alpha-2 country code.
    pub country: String,
    /// Postal code.
    pub postal_code: Option<String>,
    /// Recipient phone.
    pub phone: Option<String>,
}

impl ShippingAddress {
    /// Street address as a single line.
    #[must_use]
    pub fn street(&self) -> String {
        match self.line2.as_deref().filter(|l| !l.trim().is_empty()) {
            Some(line2) => format!("{}, {}", self.line1, line2),
            None => self.line1.clone(),
        }
    }
}

/// A succeeded payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    /// Provider payment intent id.
    pub id: String,
    /// Amount received.
    pub amount: Money,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::money::Currency;

    fn session(line_items: Vec<LineItem>) -> CheckoutSession {
        CheckoutSession {
            session_id: "cs_test".to_string(),
            customer: CustomerContact::default(),
            amount_total: Money::from_minor_units(4990, Currency::usd()),
            line_items,
            shipping: None,
        }
    }

    #[test]
    fn test_resolved_line_items_falls_back_to_total() {
        let items = session(vec![]).resolved_line_items();
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.sku, DEFAULT_LINE_ITEM_SKU);
        assert_eq!(item.quantity, 1);
        assert_eq!(item.unit_price, Decimal::new(4990, 2));
    }

    #[test]
    fn test_resolved_line_items_keeps_itemized_lines() {
        let line = LineItem {
            sku: "X".to_string(),
            name: None,
            quantity: 2,
            unit_price: Decimal::new(2495, 2),
            variant_id: None,
        };
        let items = session(vec![line.clone()]).resolved_line_items();
        assert_eq!(items, vec![line]);
    }

    #[test]
    fn test_street_joins_second_line() {
        let address = ShippingAddress {
            line1: "1 Main St".to_string(),
            line2: Some("Apt 4".to_string()),
            ..ShippingAddress::default()
        };
        assert_eq!(address.street(), "1 Main St, Apt 4");

        let address = ShippingAddress {
            line1: "1 Main St".to_string(),
            line2: Some("  ".to_string()),
            ..ShippingAddress::default()
        };
        assert_eq!(address.street(), "1 Main St");
    }

    #[test]
    fn test_kind_for_unknown_uses_tag() {
        let event = PaymentEvent::Unknown {
            event_type: "charge.refunded".to_string(),
        };
        assert_eq!(event.kind(), "charge.refunded");
    }
}
