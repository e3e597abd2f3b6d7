//! Domain types for the fulfillment pipeline.
//!
//! This module provides type-safe wrappers for the concepts the pipeline
//! passes between its steps.

pub mod email;
pub mod event;
pub mod fulfillment;
pub mod id;
pub mod money;
pub mod order;
pub mod status;

pub use email::{Email, EmailError};
pub use event::{
    CheckoutSession, CustomerContact, DEFAULT_LINE_ITEM_SKU, LineItem, PaymentEvent, PaymentIntent, ReceivedEvent,
    ShippingAddress,
};
pub use fulfillment::{FulfillmentLine, FulfillmentReceipt, FulfillmentRequest, resolve_variant_id};
pub use id::*;
pub use money::{Currency, Money};
pub use order::{
    Customer, NewCustomer, NewOrder, NewOrderItem, Order, OrderCreation, OrderItem, OrderNumber,
    PersonName, Product,
};
pub use status::{OrderStatus, ParseStatusError};
