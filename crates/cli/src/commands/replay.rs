//! Replay a stored payment event through the pipeline.
//!
//! The payload is not signature-checked. Intended for reconciling a delivery
//! that was missed or failed, against a non-production database.
//!
//! # Usage
//!
//! ```bash
//! dl-cli replay event.json
//! dl-cli replay event.json --with-connectors
//! ```

use std::path::Path;
use std::sync::Arc;

use dropline_webhooks::config::{ConfigError, WebhookConfig};
use dropline_webhooks::db::{self, OrderRepository, ProductRepository};
use dropline_webhooks::pipeline::CheckoutPipeline;
use dropline_webhooks::state::{StateError, build_pipeline};
use dropline_webhooks::webhook::{RouteOutcome, VerifyError, parse_event, route_event};
use thiserror::Error;

/// Errors that can occur while replaying.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Refusing to replay events with DROPLINE_ENV=production")]
    Production,

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Payload(#[from] VerifyError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Connectors(#[from] StateError),

    #[error("Failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Parse `file` as a webhook payload and run it.
///
/// Outbound connectors are only used with `with_connectors`; otherwise the
/// pipeline touches the database only.
///
/// # Errors
///
/// Returns an error in production, or if the file, payload, configuration
/// or database is unusable. Pipeline step failures are part of the report.
pub async fn run(file: &Path, with_connectors: bool) -> Result<(), ReplayError> {
    let config = WebhookConfig::from_env()?;
    if config.environment.is_production() {
        return Err(ReplayError::Production);
    }

    let payload = tokio::fs::read(file).await.map_err(|source| ReplayError::Read {
        path: file.display().to_string(),
        source,
    })?;
    let event = parse_event(&payload)?;
    tracing::info!(event_id = %event.id, kind = event.event.kind(), "Replaying event");

    let pool = db::create_pool(&config.database_url).await?;
    let pipeline = if with_connectors {
        build_pipeline(&config, pool)?
    } else {
        CheckoutPipeline::new(
            Arc::new(OrderRepository::new(pool.clone())),
            Arc::new(ProductRepository::new(pool)),
            None,
        )
        .with_fallback_variant(config.fallback_variant_id().map(str::to_string))
    };

    let output = match route_event(&pipeline, event).await {
        RouteOutcome::Fulfilled(report) => serde_json::to_string_pretty(&report)?,
        RouteOutcome::PaymentLogged => r#"{"result":"payment_logged"}"#.to_string(),
        RouteOutcome::Ignored => r#"{"result":"ignored"}"#.to_string(),
    };

    #[allow(clippy::print_stdout)]
    {
        println!("{output}");
    }
    Ok(())
}
