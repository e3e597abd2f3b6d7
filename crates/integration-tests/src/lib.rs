//! Integration test support for Dropline.
//!
//! In-memory implementations of every pipeline port, a payload signer and
//! builders for provider events. Tests live in `tests/` and drive either
//! [`CheckoutPipeline`] directly or the axum router via `oneshot`.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p dropline-integration-tests
//!
//! # Include the PostgreSQL-backed tests
//! DROPLINE_TEST_DATABASE_URL=postgres://... cargo test -p dropline-integration-tests -- --ignored
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::SecretString;
use serde_json::{Value, json};
use sha2::Sha256;

use dropline_core::{
    Customer, CustomerId, FulfillmentReceipt, FulfillmentRequest, NewCustomer, NewOrder, Order,
    OrderCreation, OrderId, OrderItem, OrderItemId, OrderStatus, PersonName, Product, ProductId,
};
use dropline_webhooks::db::RepositoryError;
use dropline_webhooks::pipeline::{
    BoxError, CheckoutPipeline, CrmConnector, CrmContact, EmailSender, FulfillmentProvider,
    InventoryLedger, OrderConfirmation, OrderStore,
};
use dropline_webhooks::services::{BREVO_CONNECTOR, KLAVIYO_CONNECTOR};
use dropline_webhooks::state::AppState;
use dropline_webhooks::webhook::SignatureVerifier;

/// Signing secret shared by tests.
pub const TEST_SECRET: &str = "whsec_it_3Jd8sQ1vLm7ZpX2k";

// ============================================================================
// Order store and inventory ledger
// ============================================================================

#[derive(Default)]
struct StoreState {
    customers: Vec<Customer>,
    orders: Vec<Order>,
    products: HashMap<String, Product>,
    next_item_id: i32,
}

/// Mutex-guarded order store and inventory ledger.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    fail_orders: AtomicBool,
    decrements: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add a catalog product.
    pub fn add_product(&self, sku: &str, stock: i32, variant_id: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        let id = i32::try_from(state.products.len()).unwrap() + 1;
        state.products.insert(
            sku.to_string(),
            Product {
                id: ProductId::new(id),
                sku: sku.to_string(),
                name: format!("Product {sku}"),
                stock,
                fulfillment_variant_id: variant_id.map(str::to_string),
            },
        );
    }

    /// Make every order insert fail.
    pub fn fail_orders(&self) {
        self.fail_orders.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn stock(&self, sku: &str) -> Option<i32> {
        self.state.lock().unwrap().products.get(sku).map(|p| p.stock)
    }

    #[must_use]
    pub fn orders(&self) -> Vec<Order> {
        self.state.lock().unwrap().orders.clone()
    }

    #[must_use]
    pub fn customers(&self) -> Vec<Customer> {
        self.state.lock().unwrap().customers.clone()
    }

    /// Number of successful stock decrements.
    #[must_use]
    pub fn decrement_count(&self) -> usize {
        self.decrements.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn upsert_customer(&self, customer: &NewCustomer) -> Result<Customer, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state
            .customers
            .iter_mut()
            .find(|c| c.email == customer.email)
        {
            existing.name = PersonName {
                first: customer.name.first.clone().or(existing.name.first.take()),
                last: customer.name.last.clone().or(existing.name.last.take()),
            };
            existing.phone = customer.phone.clone().or(existing.phone.take());
            return Ok(existing.clone());
        }

        let id = i32::try_from(state.customers.len()).unwrap() + 1;
        let stored = Customer {
            id: CustomerId::new(id),
            email: customer.email.clone(),
            name: customer.name.clone(),
            phone: customer.phone.clone(),
        };
        state.customers.push(stored.clone());
        Ok(stored)
    }

    async fn create_order(&self, order: &NewOrder) -> Result<OrderCreation, RepositoryError> {
        if self.fail_orders.load(Ordering::SeqCst) {
            return Err(RepositoryError::DataCorruption("order store offline".to_string()));
        }

        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state
            .orders
            .iter()
            .find(|o| o.session_id == order.session_id)
        {
            return Ok(OrderCreation::Existing(existing.clone()));
        }

        let mut items = Vec::with_capacity(order.items.len());
        for item in &order.items {
            state.next_item_id += 1;
            items.push(OrderItem {
                id: OrderItemId::new(state.next_item_id),
                sku: item.sku.clone(),
                product_name: item.product_name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                variant_id: item.variant_id.clone(),
            });
        }

        let id = i32::try_from(state.orders.len()).unwrap() + 1;
        let stored = Order {
            id: OrderId::new(id),
            order_number: order.order_number.clone(),
            session_id: order.session_id.clone(),
            customer_id: order.customer_id,
            status: OrderStatus::Pending,
            total: order.total.clone(),
            items,
            fulfillment_order_id: None,
            fulfillment_order_number: None,
            created_at: Utc::now(),
        };
        state.orders.push(stored.clone());
        Ok(OrderCreation::Created(stored))
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let order = state
            .orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or(RepositoryError::NotFound)?;
        if order.status.can_transition_to(status) {
            order.status = status;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn record_fulfillment(
        &self,
        id: OrderId,
        receipt: &FulfillmentReceipt,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let order = state
            .orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or(RepositoryError::NotFound)?;
        order.fulfillment_order_id = Some(receipt.external_order_id.clone());
        order.fulfillment_order_number.clone_from(&receipt.external_order_number);
        Ok(())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[async_trait]
impl InventoryLedger for MemoryStore {
    async fn find_product_by_sku(&self, sku: &str) -> Result<Option<Product>, RepositoryError> {
        Ok(self.state.lock().unwrap().products.get(sku).cloned())
    }

    async fn decrement_stock(
        &self,
        id: ProductId,
        quantity: i32,
    ) -> Result<Option<Product>, RepositoryError> {
        if quantity <= 0 {
            return Err(RepositoryError::InvalidInput(format!(
                "quantity must be positive (got {quantity})"
            )));
        }

        let mut state = self.state.lock().unwrap();
        let Some(product) = state.products.values_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        if product.stock < quantity {
            return Ok(None);
        }
        product.stock -= quantity;
        self.decrements.fetch_add(1, Ordering::SeqCst);
        Ok(Some(product.clone()))
    }
}

// ============================================================================
// Fulfillment provider
// ============================================================================

/// Records submissions; fails every call when built with [`Self::failing`].
#[derive(Default)]
pub struct RecordingFulfillment {
    requests: Mutex<Vec<FulfillmentRequest>>,
    fail: bool,
}

impl RecordingFulfillment {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    #[must_use]
    pub fn requests(&self) -> Vec<FulfillmentRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl FulfillmentProvider for RecordingFulfillment {
    async fn submit_order(
        &self,
        request: &FulfillmentRequest,
    ) -> Result<FulfillmentReceipt, BoxError> {
        let count = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };
        if self.fail {
            return Err("provider returned 503".into());
        }
        Ok(FulfillmentReceipt {
            external_order_id: format!("ext-{count}"),
            external_order_number: Some(format!("EXT-{}", request.order_number)),
        })
    }
}

// ============================================================================
// CRM and email
// ============================================================================

/// Records contacts; fails every call when built with [`Self::failing`].
#[derive(Default)]
pub struct RecordingCrm {
    contacts: Mutex<Vec<CrmContact>>,
    fail: bool,
}

impl RecordingCrm {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    #[must_use]
    pub fn contacts(&self) -> Vec<CrmContact> {
        self.contacts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CrmConnector for RecordingCrm {
    async fn upsert_contact(&self, contact: &CrmContact) -> Result<(), BoxError> {
        self.contacts.lock().unwrap().push(contact.clone());
        if self.fail {
            return Err("crm unavailable".into());
        }
        Ok(())
    }
}

/// Records confirmation emails.
#[derive(Default)]
pub struct RecordingEmail {
    messages: Mutex<Vec<OrderConfirmation>>,
}

impl RecordingEmail {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn messages(&self) -> Vec<OrderConfirmation> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailSender for RecordingEmail {
    async fn send_order_confirmation(&self, message: &OrderConfirmation) -> Result<(), BoxError> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

/// A pipeline over in-memory fakes, with handles to inspect them.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub fulfillment: Arc<RecordingFulfillment>,
    pub klaviyo: Arc<RecordingCrm>,
    pub brevo: Arc<RecordingCrm>,
    pub email: Arc<RecordingEmail>,
    pub pipeline: CheckoutPipeline,
}

impl Harness {
    /// All connectors configured and succeeding.
    #[must_use]
    pub fn new() -> Self {
        Self::with(MemoryStore::new(), RecordingFulfillment::new(), RecordingCrm::new())
    }

    /// Build with a specific store, fulfillment provider and Klaviyo fake.
    #[must_use]
    pub fn with(
        store: Arc<MemoryStore>,
        fulfillment: Arc<RecordingFulfillment>,
        klaviyo: Arc<RecordingCrm>,
    ) -> Self {
        let brevo = RecordingCrm::new();
        let email = RecordingEmail::new();
        let orders: Arc<dyn OrderStore> = store.clone();
        let ledger: Arc<dyn InventoryLedger> = store.clone();
        let provider: Arc<dyn FulfillmentProvider> = fulfillment.clone();
        let klaviyo_crm: Arc<dyn CrmConnector> = klaviyo.clone();
        let brevo_crm: Arc<dyn CrmConnector> = brevo.clone();
        let sender: Arc<dyn EmailSender> = email.clone();

        let pipeline = CheckoutPipeline::new(orders, ledger, Some(provider))
            .with_crm(KLAVIYO_CONNECTOR, Some(klaviyo_crm))
            .with_crm(BREVO_CONNECTOR, Some(brevo_crm))
            .with_email(Some(sender));

        Self {
            store,
            fulfillment,
            klaviyo,
            brevo,
            email,
            pipeline,
        }
    }

    /// Application state verifying with [`TEST_SECRET`].
    #[must_use]
    pub fn app_state(&self) -> AppState {
        AppState::new(
            SignatureVerifier::new(Some(SecretString::from(TEST_SECRET)), 300),
            self.pipeline.clone(),
        )
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Build a `stripe-signature` header for `payload` at `timestamp`.
#[must_use]
pub fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

/// Sign `payload` with [`TEST_SECRET`] at the current time.
#[must_use]
pub fn sign_now(payload: &[u8]) -> String {
    sign(TEST_SECRET, Utc::now().timestamp(), payload)
}

/// A `checkout.session.completed` event around `session`.
#[must_use]
pub fn checkout_event(session: &Value) -> Value {
    json!({
        "id": "evt_test_checkout",
        "type": "checkout.session.completed",
        "data": { "object": session },
    })
}

/// A paid checkout session object with `metadata.items`.
#[must_use]
pub fn checkout_session(session_id: &str, email: &str, items: &Value, amount_total: i64) -> Value {
    json!({
        "id": session_id,
        "object": "checkout.session",
        "customer_details": { "email": email, "name": "Ada Lovelace" },
        "amount_total": amount_total,
        "currency": "usd",
        "metadata": { "items": items.to_string() },
        "shipping_details": {
            "name": "Ada Lovelace",
            "address": {
                "line1": "1 Main St",
                "city": "Springfield",
                "state": "IL",
                "country": "US",
                "postal_code": "62701"
            }
        }
    })
}

/// Parse a checkout event the way the verifier does.
#[must_use]
pub fn parse_checkout(event: &Value) -> dropline_core::CheckoutSession {
    let received = dropline_webhooks::webhook::parse_event(event.to_string().as_bytes()).unwrap();
    match received.event {
        dropline_core::PaymentEvent::CheckoutCompleted(session) => session,
        other => panic!("expected a checkout event, got {other:?}"),
    }
}
