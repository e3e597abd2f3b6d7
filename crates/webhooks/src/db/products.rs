//! Catalog repository and inventory ledger.

use async_trait::async_trait;
use sqlx::PgPool;

use dropline_core::{Product, ProductId};

use super::RepositoryError;
use crate::pipeline::InventoryLedger;

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i32,
    sku: String,
    name: String,
    stock: i32,
    fulfillment_variant_id: Option<String>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: ProductId::new(row.id),
            sku: row.sku,
            name: row.name,
            stock: row.stock,
            fulfillment_variant_id: row.fulfillment_variant_id,
        }
    }
}

/// Catalog fields for seeding or updating a product.
#[derive(Debug, Clone)]
pub struct ProductUpsert {
    pub sku: String,
    pub name: String,
    pub stock: i32,
    pub fulfillment_variant_id: Option<String>,
}

/// Postgres-backed [`InventoryLedger`].
#[derive(Clone)]
pub struct ProductRepository {
    pool: PgPool,
}

impl ProductRepository {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a product or overwrite the existing row with the same SKU.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::InvalidInput` if `stock` is negative.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert(&self, product: &ProductUpsert) -> Result<Product, RepositoryError> {
        if product.stock < 0 {
            return Err(RepositoryError::InvalidInput(format!(
                "stock must not be negative (got {})",
                product.stock
            )));
        }

        let row = sqlx::query_as::<_, ProductRow>(
            r"
            INSERT INTO products (sku, name, stock, fulfillment_variant_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (sku) DO UPDATE SET
                name = EXCLUDED.name,
                stock = EXCLUDED.stock,
                fulfillment_variant_id = EXCLUDED.fulfillment_variant_id,
                updated_at = now()
            RETURNING id, sku, name, stock, fulfillment_variant_id
            ",
        )
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.stock)
        .bind(product.fulfillment_variant_id.as_deref())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }
}

#[async_trait]
impl InventoryLedger for ProductRepository {
    async fn find_product_by_sku(&self, sku: &str) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, sku, name, stock, fulfillment_variant_id
            FROM products
            WHERE sku = $1
            ",
        )
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Product::from))
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

        // Single conditional update: concurrent decrements serialize on the row lock.
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            UPDATE products
            SET stock = stock - $2, updated_at = now()
            WHERE id = $1 AND stock >= $2
            RETURNING id, sku, name, stock, fulfillment_variant_id
            ",
        )
        .bind(id.as_i32())
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Product::from))
    }
}
