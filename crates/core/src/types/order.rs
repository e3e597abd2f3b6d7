//! Customer, order and catalog records.

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::email::Email;
use super::event::CheckoutSession;
use super::id::{CustomerId, OrderId, OrderItemId, ProductId};
use super::money::Money;
use super::status::OrderStatus;

/// Prefix for generated order numbers.
const ORDER_NUMBER_PREFIX: &str = "DL";

/// Length of the random suffix of an order number.
const ORDER_NUMBER_SUFFIX_LEN: usize = 6;

/// Human-facing order number, e.g. `DL-261018-7QK2ZP`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Generate a fresh order number for an order placed at `placed_at`.
    #[must_use]
    pub fn generate(placed_at: DateTime<Utc>) -> Self {
        let suffix: String = rand::rng()
            .sample_iter(Alphanumeric)
            .take(ORDER_NUMBER_SUFFIX_LEN)
            .map(|b| char::from(b).to_ascii_uppercase())
            .collect();
        Self(format!(
            "{ORDER_NUMBER_PREFIX}-{}-{suffix}",
            placed_at.format("%y%m%d")
        ))
    }

    /// Wrap an order number loaded from storage.
    #[must_use]
    pub const fn from_stored(value: String) -> Self {
        Self(value)
    }

    /// The order number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A display name split into first and last name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonName {
    pub first: Option<String>,
    pub last: Option<String>,
}

impl PersonName {
    /// Split a display name: the first token is the first name, everything
    /// after it is the last name.
    ///
    /// ```
    /// use dropline_core::PersonName;
    ///
    /// let name = PersonName::from_display("Ada King Lovelace");
    /// assert_eq!(name.first.as_deref(), Some("Ada"));
    /// assert_eq!(name.last.as_deref(), Some("King Lovelace"));
    /// ```
    #[must_use]
    pub fn from_display(display: &str) -> Self {
        let mut tokens = display.split_whitespace();
        let first = tokens.next().map(str::to_string);
        let rest = tokens.collect::<Vec<_>>().join(" ");
        Self {
            first,
            last: (!rest.is_empty()).then_some(rest),
        }
    }

    /// Name for email salutations, falling back to `fallback`.
    #[must_use]
    pub fn display_or(&self, fallback: &str) -> String {
        match (&self.first, &self.last) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => fallback.to_string(),
        }
    }
}

/// Customer fields to upsert, keyed by email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCustomer {
    pub email: Email,
    pub name: PersonName,
    pub phone: Option<String>,
}

/// A stored customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Customer {
    pub id: CustomerId,
    pub email: Email,
    pub name: PersonName,
    pub phone: Option<String>,
}

/// A catalog product as seen by the inventory ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    /// Units on hand; never negative.
    pub stock: i32,
    /// Dropshipping variant configured for this product.
    pub fulfillment_variant_id: Option<String>,
}

/// Order item to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub sku: String,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub variant_id: Option<String>,
}

/// Order to insert, keyed by the provider session id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub order_number: OrderNumber,
    pub session_id: String,
    pub customer_id: CustomerId,
    pub total: Money,
    pub items: Vec<NewOrderItem>,
}

impl NewOrder {
    /// Build the order for a completed checkout.
    #[must_use]
    pub fn for_checkout(
        order_number: OrderNumber,
        customer_id: CustomerId,
        session: &CheckoutSession,
    ) -> Self {
        let items = session
            .resolved_line_items()
            .into_iter()
            .map(|line| NewOrderItem {
                product_name: line.name.unwrap_or_else(|| line.sku.clone()),
                sku: line.sku,
                quantity: line.quantity,
                unit_price: line.unit_price,
                variant_id: line.variant_id,
            })
            .collect();

        Self {
            order_number,
            session_id: session.session_id.clone(),
            customer_id,
            total: session.amount_total.clone(),
            items,
        }
    }
}

/// A stored order item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub sku: String,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub variant_id: Option<String>,
}

/// A stored order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub session_id: String,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub total: Money,
    pub items: Vec<OrderItem>,
    pub fulfillment_order_id: Option<String>,
    pub fulfillment_order_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Result of the idempotent order insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderCreation {
    /// This call inserted the order.
    Created(Order),
    /// An order already existed for the session id; nothing was written.
    Existing(Order),
}

impl OrderCreation {
    /// The order, regardless of who created it.
    #[must_use]
    pub const fn order(&self) -> &Order {
        match self {
            Self::Created(order) | Self::Existing(order) => order,
        }
    }

    /// Whether this was a redelivery of an already-materialized session.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Existing(_))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::types::event::{CustomerContact, LineItem};
    use crate::types::money::Currency;

    #[test]
    fn test_order_number_format() {
        let placed = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let number = OrderNumber::generate(placed);
        let parts: Vec<&str> = number.as_str().split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "DL");
        assert_eq!(parts[1], "261018");
        assert_eq!(parts[2].len(), ORDER_NUMBER_SUFFIX_LEN);
        assert!(
            parts[2]
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        );
    }

    #[test]
    fn test_person_name_single_token() {
        let name = PersonName::from_display("Cher");
        assert_eq!(name.first.as_deref(), Some("Cher"));
        assert_eq!(name.last, None);
    }

    #[test]
    fn test_person_name_collapses_whitespace() {
        let name = PersonName::from_display("  Grace   Brewster  Hopper ");
        assert_eq!(name.first.as_deref(), Some("Grace"));
        assert_eq!(name.last.as_deref(), Some("Brewster Hopper"));
    }

    #[test]
    fn test_person_name_empty() {
        assert_eq!(PersonName::from_display("   "), PersonName::default());
        assert_eq!(PersonName::default().display_or("there"), "there");
    }

    #[test]
    fn test_new_order_uses_sku_when_name_missing() {
        let session = CheckoutSession {
            session_id: "cs_1".to_string(),
            customer: CustomerContact::default(),
            amount_total: Money::from_minor_units(4990, Currency::usd()),
            line_items: vec![LineItem {
                sku: "X".to_string(),
                name: None,
                quantity: 2,
                unit_price: Decimal::new(2495, 2),
                variant_id: Some("vid-1".to_string()),
            }],
            shipping: None,
        };

        let order = NewOrder::for_checkout(
            OrderNumber::from_stored("DL-1".to_string()),
            CustomerId::new(3),
            &session,
        );

        assert_eq!(order.session_id, "cs_1");
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].product_name, "X");
        assert_eq!(order.items[0].variant_id.as_deref(), Some("vid-1"));
    }
}
