//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::WebhookConfig;
use crate::db::{OrderRepository, ProductRepository};
use crate::dropship::{DropshipClient, DropshipError};
use crate::pipeline::{CheckoutPipeline, CrmConnector, EmailSender, FulfillmentProvider};
use crate::services::{
    BREVO_CONNECTOR, BrevoClient, BrevoError, EmailError, EmailService, KLAVIYO_CONNECTOR,
    KlaviyoClient, KlaviyoError,
};
use crate::webhook::SignatureVerifier;

/// Error constructing an outbound client from configuration.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("dropship client: {0}")]
    Dropship(#[from] DropshipError),
    #[error("klaviyo client: {0}")]
    Klaviyo(#[from] KlaviyoError),
    #[error("brevo client: {0}")]
    Brevo(#[from] BrevoError),
    #[error("email service: {0}")]
    Email(#[from] EmailError),
}

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    verifier: SignatureVerifier,
    pipeline: CheckoutPipeline,
}

impl AppState {
    /// Create state from an already assembled verifier and pipeline.
    #[must_use]
    pub fn new(verifier: SignatureVerifier, pipeline: CheckoutPipeline) -> Self {
        Self {
            inner: Arc::new(AppStateInner { verifier, pipeline }),
        }
    }

    /// Wire the Postgres repositories and every configured connector.
    ///
    /// Connectors without configuration are registered as absent so the
    /// pipeline reports them as skipped.
    ///
    /// # Errors
    ///
    /// Returns `StateError` if a configured client cannot be built.
    pub fn from_config(config: &WebhookConfig, pool: PgPool) -> Result<Self, StateError> {
        let verifier = SignatureVerifier::new(
            config.signing.secret.clone(),
            config.signing.tolerance_secs,
        );
        if !verifier.is_signed() {
            tracing::warn!("STRIPE_WEBHOOK_SECRET not set; accepting unsigned webhooks");
        }

        let pipeline = build_pipeline(config, pool)?;
        Ok(Self::new(verifier, pipeline))
    }

    /// Webhook signature verifier.
    #[must_use]
    pub fn verifier(&self) -> &SignatureVerifier {
        &self.inner.verifier
    }

    /// Checkout fulfillment pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &CheckoutPipeline {
        &self.inner.pipeline
    }
}

/// Assemble the checkout pipeline from configuration.
///
/// # Errors
///
/// Returns `StateError` if a configured client cannot be built.
pub fn build_pipeline(config: &WebhookConfig, pool: PgPool) -> Result<CheckoutPipeline, StateError> {
    let timeout = config.http_timeout;

    let fulfillment: Option<Arc<dyn FulfillmentProvider>> = match &config.dropship {
        Some(dropship) => Some(Arc::new(DropshipClient::new(dropship, timeout)?)),
        None => None,
    };
    let klaviyo: Option<Arc<dyn CrmConnector>> = match &config.klaviyo {
        Some(klaviyo) => Some(Arc::new(KlaviyoClient::new(klaviyo, timeout)?)),
        None => None,
    };
    let brevo: Option<Arc<dyn CrmConnector>> = match &config.brevo {
        Some(brevo) => Some(Arc::new(BrevoClient::new(brevo, timeout)?)),
        None => None,
    };
    let email: Option<Arc<dyn EmailSender>> = match &config.email {
        Some(email) => Some(Arc::new(EmailService::new(email, timeout)?)),
        None => None,
    };

    tracing::info!(
        dropship = fulfillment.is_some(),
        klaviyo = klaviyo.is_some(),
        brevo = brevo.is_some(),
        email = email.is_some(),
        "Connectors configured"
    );

    let orders = Arc::new(OrderRepository::new(pool.clone()));
    let ledger = Arc::new(ProductRepository::new(pool));

    Ok(CheckoutPipeline::new(orders, ledger, fulfillment)
        .with_fallback_variant(config.fallback_variant_id().map(str::to_string))
        .with_crm(KLAVIYO_CONNECTOR, klaviyo)
        .with_crm(BREVO_CONNECTOR, brevo)
        .with_email(email))
}
