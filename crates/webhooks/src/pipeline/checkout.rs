//! Checkout-completed orchestration.
//!
//! ```text
//! materialize order ──► adjust stock ──► mark PAID ──► dispatch ──┐
//!        │ (failed: skip to notifications)                          ▼
//!        └────────────────────────────────────────────────► notify (CRMs + email, concurrently)
//! ```
//!
//! The customer has already been charged when this runs, so no step can fail
//! the request. A redelivered session stops after materialization.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::instrument;

use dropline_core::{
    CheckoutSession, DEFAULT_LINE_ITEM_SKU, Email, FulfillmentLine, FulfillmentRequest, Money,
    NewCustomer, NewOrder, Order, OrderCreation, OrderNumber, OrderStatus, PersonName, Product,
};

use super::ports::{
    CrmConnector, CrmContact, EmailSender, FulfillmentProvider, InventoryLedger,
    OrderConfirmation, OrderStore,
};
use super::report::{
    CheckoutReport, FulfillmentOutcome, Materialization, NotificationOutcome, NotificationStatus,
    StockAdjustment, StockOutcome,
};

/// Connector name used for the confirmation email in reports.
pub const EMAIL_CONNECTOR: &str = "email";

/// A CRM registered with the pipeline, possibly unconfigured.
#[derive(Clone)]
struct CrmSlot {
    name: &'static str,
    connector: Option<Arc<dyn CrmConnector>>,
}

/// Runs a completed checkout through order, stock, dispatch and notifications.
#[derive(Clone)]
pub struct CheckoutPipeline {
    orders: Arc<dyn OrderStore>,
    ledger: Arc<dyn InventoryLedger>,
    fulfillment: Option<Arc<dyn FulfillmentProvider>>,
    fallback_variant_id: Option<String>,
    crms: Vec<CrmSlot>,
    email: Option<Arc<dyn EmailSender>>,
}

impl CheckoutPipeline {
    /// Create a pipeline without notification connectors.
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrderStore>,
        ledger: Arc<dyn InventoryLedger>,
        fulfillment: Option<Arc<dyn FulfillmentProvider>>,
    ) -> Self {
        Self {
            orders,
            ledger,
            fulfillment,
            fallback_variant_id: None,
            crms: Vec::new(),
            email: None,
        }
    }

    /// Variant used when neither the line nor the catalog provides one.
    #[must_use]
    pub fn with_fallback_variant(mut self, variant_id: Option<String>) -> Self {
        self.fallback_variant_id = variant_id.filter(|v| !v.trim().is_empty());
        self
    }

    /// Register a CRM. `None` reports the connector as skipped.
    #[must_use]
    pub fn with_crm(
        mut self,
        name: &'static str,
        connector: Option<Arc<dyn CrmConnector>>,
    ) -> Self {
        self.crms.push(CrmSlot { name, connector });
        self
    }

    /// Register the confirmation email sender. `None` reports email as skipped.
    #[must_use]
    pub fn with_email(mut self, sender: Option<Arc<dyn EmailSender>>) -> Self {
        self.email = sender;
        self
    }

    /// The order store backing this pipeline.
    #[must_use]
    pub fn orders(&self) -> &Arc<dyn OrderStore> {
        &self.orders
    }

    /// Process one completed checkout.
    #[instrument(skip_all, fields(session_id = %session.session_id))]
    pub async fn handle(&self, session: &CheckoutSession) -> CheckoutReport {
        let Some(email) = session.customer.email.clone() else {
            tracing::warn!("Checkout completed without a usable email; acknowledging only");
            return CheckoutReport::new(&session.session_id, Materialization::MissingEmail);
        };

        let placed_at = Utc::now();
        let name = session
            .customer
            .name
            .as_deref()
            .map(PersonName::from_display)
            .unwrap_or_default();

        let materialization = self
            .materialize(session, &email, &name, OrderNumber::generate(placed_at))
            .await;

        let mut report = CheckoutReport::new(&session.session_id, materialization);

        let order = match &report.materialization {
            Materialization::Duplicate(order) => {
                tracing::info!(
                    order_number = %order.order_number,
                    "Duplicate delivery for an existing order; skipping side effects"
                );
                report.order_number = Some(order.order_number.clone());
                return report;
            }
            Materialization::Created(order) => Some(order.as_ref().clone()),
            Materialization::Failed(_) | Materialization::MissingEmail => None,
        };
        // Only a stored order number is shown to the customer.
        let order_number = order.as_ref().map(|o| o.order_number.clone());
        report.order_number.clone_from(&order_number);

        if let Some(mut order) = order {
            let catalog = self.adjust_stock(&order, &mut report.stock).await;
            report.marked_paid = self.mark_paid(&order).await;
            if report.marked_paid {
                order.status = OrderStatus::Paid;
            }
            report.fulfillment = self.dispatch(&order, session, &email, &catalog).await;
            if report.marked_paid {
                report.materialization = Materialization::Created(Box::new(order));
            }
        }

        let notice = Notice {
            email,
            name,
            phone: session.customer.phone.clone(),
            order_number,
            total: session.amount_total.clone(),
            placed_at,
        };
        report.notifications = self.notify(&notice).await;

        report
    }

    /// Upsert the customer and create the order keyed by session id.
    async fn materialize(
        &self,
        session: &CheckoutSession,
        email: &Email,
        name: &PersonName,
        order_number: OrderNumber,
    ) -> Materialization {
        let new_customer = NewCustomer {
            email: email.clone(),
            name: name.clone(),
            phone: session.customer.phone.clone(),
        };

        let customer = match self.orders.upsert_customer(&new_customer).await {
            Ok(customer) => customer,
            Err(e) => {
                tracing::error!(error = %e, "Order materialization failed: customer upsert");
                return Materialization::Failed(e.to_string());
            }
        };

        let new_order = NewOrder::for_checkout(order_number, customer.id, session);
        match self.orders.create_order(&new_order).await {
            Ok(OrderCreation::Created(order)) => {
                tracing::info!(
                    order_number = %order.order_number,
                    items = order.items.len(),
                    "Order created"
                );
                Materialization::Created(Box::new(order))
            }
            Ok(OrderCreation::Existing(order)) => Materialization::Duplicate(Box::new(order)),
            Err(e) => {
                tracing::error!(error = %e, "Order materialization failed: order insert");
                Materialization::Failed(e.to_string())
            }
        }
    }

    /// Decrement stock for each item; returns the products found, keyed by SKU.
    async fn adjust_stock(
        &self,
        order: &Order,
        adjustments: &mut Vec<StockAdjustment>,
    ) -> HashMap<String, Product> {
        let mut catalog = HashMap::new();

        for item in &order.items {
            if item.sku == DEFAULT_LINE_ITEM_SKU {
                continue;
            }

            let outcome = match self.ledger.find_product_by_sku(&item.sku).await {
                Ok(Some(product)) => {
                    let outcome = match self.ledger.decrement_stock(product.id, item.quantity).await
                    {
                        Ok(Some(updated)) => StockOutcome::Decremented {
                            remaining: updated.stock,
                        },
                        Ok(None) => {
                            tracing::warn!(
                                sku = %item.sku,
                                requested = item.quantity,
                                available = product.stock,
                                order_number = %order.order_number,
                                "Insufficient stock; item oversold"
                            );
                            StockOutcome::Insufficient {
                                available: product.stock,
                            }
                        }
                        Err(e) => {
                            tracing::error!(sku = %item.sku, error = %e, "Stock decrement failed");
                            StockOutcome::Failed {
                                error: e.to_string(),
                            }
                        }
                    };
                    catalog.insert(item.sku.clone(), product);
                    outcome
                }
                Ok(None) => {
                    tracing::warn!(sku = %item.sku, "Unknown product; stock not adjusted");
                    StockOutcome::UnknownProduct
                }
                Err(e) => {
                    tracing::error!(sku = %item.sku, error = %e, "Product lookup failed");
                    StockOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };

            adjustments.push(StockAdjustment {
                sku: item.sku.clone(),
                requested: item.quantity,
                outcome,
            });
        }

        catalog
    }

    async fn mark_paid(&self, order: &Order) -> bool {
        match self
            .orders
            .update_order_status(order.id, OrderStatus::Paid)
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!(
                    order_number = %order.order_number,
                    status = %order.status,
                    "Order not in a state that can move to paid"
                );
                false
            }
            Err(e) => {
                tracing::error!(order_number = %order.order_number, error = %e, "Failed to mark order paid");
                false
            }
        }
    }

    async fn dispatch(
        &self,
        order: &Order,
        session: &CheckoutSession,
        email: &Email,
        catalog: &HashMap<String, Product>,
    ) -> FulfillmentOutcome {
        let Some(provider) = &self.fulfillment else {
            tracing::debug!("No dropshipping provider configured");
            return FulfillmentOutcome::NotConfigured;
        };

        let Some(shipping) = session.shipping.clone() else {
            tracing::warn!(order_number = %order.order_number, "No shipping address; dispatch skipped");
            return FulfillmentOutcome::NoShippingAddress;
        };

        let lines = FulfillmentLine::plan(
            &order.items,
            catalog,
            self.fallback_variant_id.as_deref(),
        );
        if lines.is_empty() {
            tracing::info!(
                order_number = %order.order_number,
                "No item resolved to a provider variant; dispatch skipped"
            );
            return FulfillmentOutcome::NoResolvableLines;
        }

        let request = FulfillmentRequest::for_order(order, shipping, email.clone(), lines);
        match provider.submit_order(&request).await {
            Ok(receipt) => {
                tracing::info!(
                    order_number = %order.order_number,
                    external_order_id = %receipt.external_order_id,
                    "Dropshipping order submitted"
                );
                if let Err(e) = self.orders.record_fulfillment(order.id, &receipt).await {
                    tracing::error!(
                        order_number = %order.order_number,
                        external_order_id = %receipt.external_order_id,
                        error = %e,
                        "Failed to record dropshipping reference"
                    );
                }
                FulfillmentOutcome::Submitted { receipt }
            }
            Err(e) => {
                tracing::error!(
                    order_number = %order.order_number,
                    error = %e,
                    "Dropshipping dispatch failed; order stays paid without external reference"
                );
                FulfillmentOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Fan out to every CRM and the email sender concurrently.
    async fn notify(&self, notice: &Notice) -> Vec<NotificationOutcome> {
        let contact = notice.contact();
        let confirmation = notice.confirmation();

        let crm_calls = self.crms.iter().map(|slot| {
            let contact = &contact;
            async move {
                let status = match &slot.connector {
                    Some(connector) => match connector.upsert_contact(contact).await {
                        Ok(()) => NotificationStatus::Delivered,
                        Err(e) => {
                            tracing::warn!(connector = slot.name, error = %e, "CRM upsert failed");
                            NotificationStatus::Failed {
                                error: e.to_string(),
                            }
                        }
                    },
                    None => NotificationStatus::Skipped,
                };
                NotificationOutcome {
                    connector: slot.name,
                    status,
                }
            }
        });

        let email_call = async {
            let status = match &self.email {
                Some(sender) => match sender.send_order_confirmation(&confirmation).await {
                    Ok(()) => NotificationStatus::Delivered,
                    Err(e) => {
                        tracing::warn!(connector = EMAIL_CONNECTOR, error = %e, "Confirmation email failed");
                        NotificationStatus::Failed {
                            error: e.to_string(),
                        }
                    }
                },
                None => NotificationStatus::Skipped,
            };
            NotificationOutcome {
                connector: EMAIL_CONNECTOR,
                status,
            }
        };

        let (mut outcomes, email_outcome) = tokio::join!(join_all(crm_calls), email_call);
        outcomes.push(email_outcome);
        outcomes
    }
}

/// What notifications need to know about a delivery.
struct Notice {
    email: Email,
    name: PersonName,
    phone: Option<String>,
    order_number: Option<OrderNumber>,
    total: Money,
    placed_at: DateTime<Utc>,
}

impl Notice {
    fn contact(&self) -> CrmContact {
        CrmContact {
            email: self.email.clone(),
            first_name: self.name.first.clone(),
            last_name: self.name.last.clone(),
            phone: self.phone.clone(),
            last_order_number: self.order_number.as_ref().map(ToString::to_string),
            last_order_amount: self.total.amount,
            currency: self.total.currency.clone(),
            last_order_date: self.placed_at,
        }
    }

    fn confirmation(&self) -> OrderConfirmation {
        OrderConfirmation {
            to: self.email.clone(),
            display_name: self.name.display_or(self.email.local_part()),
            order_number: self.order_number.as_ref().map(ToString::to_string),
            order_date: self.placed_at.format("%B %-d, %Y").to_string(),
            total: self.total.formatted(),
            currency: self.total.currency.code().to_string(),
        }
    }
}
