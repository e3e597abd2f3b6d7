//! Catalog management commands.
//!
//! # Usage
//!
//! ```bash
//! dl-cli product upsert --sku MUG-01 --name "Camp Mug" --stock 40 --variant-id 1793...
//! ```

use dropline_webhooks::db::{self, ProductRepository, ProductUpsert, RepositoryError};
use thiserror::Error;

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum ProductError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database connection error: {0}")]
    Connect(#[from] sqlx::Error),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Invalid SKU: must not be empty")]
    EmptySku,
}

/// Insert or overwrite a product by SKU.
///
/// # Errors
///
/// Returns an error if the input is invalid or the database write fails.
pub async fn upsert(product: ProductUpsert) -> Result<(), ProductError> {
    let product = ProductUpsert {
        sku: product.sku.trim().to_string(),
        fulfillment_variant_id: product
            .fulfillment_variant_id
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()),
        ..product
    };
    if product.sku.is_empty() {
        return Err(ProductError::EmptySku);
    }

    let database_url =
        super::database_url().ok_or(ProductError::MissingEnvVar("DROPLINE_DATABASE_URL"))?;
    let pool = db::create_pool(&database_url).await?;

    let saved = ProductRepository::new(pool).upsert(&product).await?;

    tracing::info!(
        id = %saved.id,
        sku = %saved.sku,
        stock = saved.stock,
        variant_id = saved.fulfillment_variant_id.as_deref().unwrap_or("-"),
        "Product saved"
    );
    Ok(())
}
