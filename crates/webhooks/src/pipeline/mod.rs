//! Post-payment fulfillment pipeline.

pub mod checkout;
pub mod ports;
pub mod report;

pub use checkout::{CheckoutPipeline, EMAIL_CONNECTOR};
pub use ports::{
    BoxError, CrmConnector, CrmContact, EmailSender, FulfillmentProvider, InventoryLedger,
    OrderConfirmation, OrderStore,
};
pub use report::{
    CheckoutReport, FulfillmentOutcome, Materialization, NotificationOutcome, NotificationStatus,
    StockAdjustment, StockOutcome,
};
