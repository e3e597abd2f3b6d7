//! Outcome records produced by one run of the checkout pipeline.
//!
//! Every step captures its failure here instead of returning `Err`; the HTTP
//! layer only reads the report for logging.

use dropline_core::{FulfillmentReceipt, Order, OrderNumber};
use serde::Serialize;

/// Result of the idempotent order insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum Materialization {
    /// This delivery created the order.
    Created(Box<Order>),
    /// The session was already materialized; no side effects were repeated.
    Duplicate(Box<Order>),
    /// The store failed; downstream ledger and dispatch steps were skipped.
    Failed(String),
    /// The event carried no usable email; nothing was done.
    MissingEmail,
}

/// Ledger result for one order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockAdjustment {
    pub sku: String,
    pub requested: i32,
    pub outcome: StockOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StockOutcome {
    Decremented { remaining: i32 },
    /// Rejected without mutation; the item is oversold.
    Insufficient { available: i32 },
    UnknownProduct,
    Failed { error: String },
}

/// Result of the dropshipping dispatch step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum FulfillmentOutcome {
    Submitted { receipt: FulfillmentReceipt },
    /// No order to dispatch (duplicate delivery or failed materialization).
    NoOrder,
    NotConfigured,
    NoShippingAddress,
    /// No item resolved to a provider variant; the provider was not called.
    NoResolvableLines,
    Failed { error: String },
}

/// Per-connector notification record. Purely observational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationOutcome {
    pub connector: &'static str,
    pub status: NotificationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum NotificationStatus {
    Delivered,
    Failed { error: String },
    /// Connector not configured.
    Skipped,
}

/// Everything one checkout delivery did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutReport {
    pub session_id: String,
    /// Number of the stored order; `None` when nothing was persisted.
    pub order_number: Option<OrderNumber>,
    pub materialization: Materialization,
    pub stock: Vec<StockAdjustment>,
    pub marked_paid: bool,
    pub fulfillment: FulfillmentOutcome,
    pub notifications: Vec<NotificationOutcome>,
}

impl CheckoutReport {
    pub(crate) fn new(session_id: &str, materialization: Materialization) -> Self {
        Self {
            session_id: session_id.to_string(),
            order_number: None,
            materialization,
            stock: Vec::new(),
            marked_paid: false,
            fulfillment: FulfillmentOutcome::NoOrder,
            notifications: Vec::new(),
        }
    }

    /// The materialized order, if any.
    #[must_use]
    pub fn order(&self) -> Option<&Order> {
        match &self.materialization {
            Materialization::Created(order) | Materialization::Duplicate(order) => Some(order),
            Materialization::Failed(_) | Materialization::MissingEmail => None,
        }
    }

    /// Whether this delivery repeated an already-processed session.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self.materialization, Materialization::Duplicate(_))
    }

    /// Outcome of the named connector.
    #[must_use]
    pub fn notification(&self, connector: &str) -> Option<&NotificationStatus> {
        self.notifications
            .iter()
            .find(|n| n.connector == connector)
            .map(|n| &n.status)
    }
}
