//! Dropshipping order submission.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::email::Email;
use super::event::ShippingAddress;
use super::order::{Order, OrderItem, Product};

/// Pick the dropshipping variant for an order line.
///
/// Precedence: the line's own variant, then the catalog product's configured
/// variant, then the process-wide fallback. Blank strings count as absent.
#[must_use]
pub fn resolve_variant_id(
    line_variant: Option<&str>,
    product_variant: Option<&str>,
    fallback: Option<&str>,
) -> Option<String> {
    [line_variant, product_variant, fallback]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// One line of a dropshipping order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentLine {
    /// Provider variant id.
    pub variant_id: String,
    pub quantity: i32,
    /// Our order item id, echoed back by the provider.
    pub line_reference_id: String,
}

impl FulfillmentLine {
    /// Build fulfillment lines for `items`.
    ///
    /// `catalog` maps SKU to the product snapshot taken during stock
    /// adjustment. Items with no resolvable variant are dropped.
    #[must_use]
    pub fn plan(
        items: &[OrderItem],
        catalog: &HashMap<String, Product>,
        fallback: Option<&str>,
    ) -> Vec<Self> {
        items
            .iter()
            .filter_map(|item| {
                let product_variant = catalog
                    .get(&item.sku)
                    .and_then(|p| p.fulfillment_variant_id.as_deref());
                let variant_id =
                    resolve_variant_id(item.variant_id.as_deref(), product_variant, fallback)?;
                Some(Self {
                    variant_id,
                    quantity: item.quantity,
                    line_reference_id: item.id.to_string(),
                })
            })
            .collect()
    }
}

/// A dropshipping order ready to submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentRequest {
    /// Our order number, used as the provider's external reference.
    pub order_number: String,
    pub shipping: ShippingAddress,
    pub email: Email,
    /// Free-text note attached to the provider order.
    pub remark: String,
    pub lines: Vec<FulfillmentLine>,
}

impl FulfillmentRequest {
    /// Build the request for a paid order.
    #[must_use]
    pub fn for_order(
        order: &Order,
        shipping: ShippingAddress,
        email: Email,
        lines: Vec<FulfillmentLine>,
    ) -> Self {
        Self {
            order_number: order.order_number.to_string(),
            shipping,
            email,
            remark: format!("Order {}", order.order_number),
            lines,
        }
    }
}

/// Provider identifiers for an accepted dropshipping order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentReceipt {
    pub external_order_id: String,
    pub external_order_number: Option<String>,
}
