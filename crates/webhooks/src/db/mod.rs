//! Database operations for the fulfillment `PostgreSQL` store.
//!
//! ## Tables
//!
//! - `customers` - One row per normalized email
//! - `orders` - One row per payment session (`session_id` is unique)
//! - `order_items` - Ordered lines owned by an order
//! - `products` - SKU-keyed catalog with non-negative `stock`
//!
//! # Migrations
//!
//! Migrations are stored in `crates/webhooks/migrations/` and run via:
//! ```bash
//! cargo run -p dropline-cli -- migrate
//! ```

pub mod orders;
pub mod products;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use orders::OrderRepository;
pub use products::{ProductRepository, ProductUpsert};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique order number).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// Caller passed a value the store refuses (e.g., non-positive quantity).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Map unique-constraint violations to `Conflict`, everything else to `Database`.
fn map_constraint(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db_err) = &err
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(db_err.message().to_string());
    }
    RepositoryError::Database(err)
}
