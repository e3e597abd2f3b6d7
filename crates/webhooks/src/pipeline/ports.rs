//! Interfaces the checkout pipeline consumes.
//!
//! Each collaborator is reached only through the narrow trait it needs, so the
//! Postgres repositories and HTTP clients can be swapped for in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use dropline_core::{
    Currency, Customer, Email, FulfillmentReceipt, FulfillmentRequest, NewCustomer, NewOrder,
    OrderCreation, OrderId, OrderStatus, Product, ProductId,
};

use crate::db::RepositoryError;

/// Error type returned by outbound connectors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Customer and order persistence.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert or update a customer keyed by email.
    async fn upsert_customer(&self, customer: &NewCustomer) -> Result<Customer, RepositoryError>;

    /// Insert an order and its items unless one already exists for the session id.
    async fn create_order(&self, order: &NewOrder) -> Result<OrderCreation, RepositoryError>;

    /// Move an order to `status` if its current status is an allowed predecessor.
    ///
    /// Returns `false` when no row changed.
    async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<bool, RepositoryError>;

    /// Store the provider identifiers of a submitted dropshipping order.
    async fn record_fulfillment(
        &self,
        id: OrderId,
        receipt: &FulfillmentReceipt,
    ) -> Result<(), RepositoryError>;

    /// Check the store is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Catalog stock.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    async fn find_product_by_sku(&self, sku: &str) -> Result<Option<Product>, RepositoryError>;

    /// Atomically remove `quantity` units.
    ///
    /// Returns the updated product, or `None` without mutating anything when
    /// stock is insufficient.
    async fn decrement_stock(
        &self,
        id: ProductId,
        quantity: i32,
    ) -> Result<Option<Product>, RepositoryError>;
}

/// Dropshipping provider.
#[async_trait]
pub trait FulfillmentProvider: Send + Sync {
    async fn submit_order(
        &self,
        request: &FulfillmentRequest,
    ) -> Result<FulfillmentReceipt, BoxError>;
}

/// Contact fields pushed to a CRM after an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrmContact {
    pub email: Email,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    /// `None` when the order could not be stored.
    pub last_order_number: Option<String>,
    pub last_order_amount: Decimal,
    pub currency: Currency,
    pub last_order_date: DateTime<Utc>,
}

/// A CRM that upserts contacts by email.
#[async_trait]
pub trait CrmConnector: Send + Sync {
    async fn upsert_contact(&self, contact: &CrmContact) -> Result<(), BoxError>;
}

/// Parameters of the order confirmation email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderConfirmation {
    pub to: Email,
    pub display_name: String,
    /// `None` when the order could not be stored.
    pub order_number: Option<String>,
    /// Human-readable order date, e.g. `October 18, 2026`.
    pub order_date: String,
    /// Total with currency symbol, e.g. `$49.90`.
    pub total: String,
    pub currency: String,
}

/// Transactional email.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_order_confirmation(&self, message: &OrderConfirmation) -> Result<(), BoxError>;
}
