//! Customer and order repository.
//!
//! Queries are built at runtime with `sqlx::query_as` so the crate builds
//! without a live database.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use dropline_core::{
    Currency, Customer, CustomerId, Email, FulfillmentReceipt, Money, NewCustomer, NewOrder,
    Order, OrderCreation, OrderId, OrderItem, OrderItemId, OrderNumber, OrderStatus, PersonName,
};

use super::{RepositoryError, map_constraint};
use crate::pipeline::OrderStore;

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    id: i32,
    email: String,
    first_name: Option<String>,
    last_name: Option<String>,
    phone: Option<String>,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = RepositoryError;

    fn try_from(row: CustomerRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: CustomerId::new(row.id),
            email,
            name: PersonName {
                first: row.first_name,
                last: row.last_name,
            },
            phone: row.phone,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    order_number: String,
    session_id: String,
    customer_id: i32,
    status: String,
    total_amount: Decimal,
    currency: String,
    fulfillment_order_id: Option<String>,
    fulfillment_order_number: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: i32,
    sku: String,
    product_name: String,
    quantity: i32,
    unit_price: Decimal,
    variant_id: Option<String>,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: OrderItemId::new(row.id),
            sku: row.sku,
            product_name: row.product_name,
            quantity: row.quantity,
            unit_price: row.unit_price,
            variant_id: row.variant_id,
        }
    }
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItemRow>) -> Result<Order, RepositoryError> {
        let status = OrderStatus::from_str(&self.status)
            .map_err(|e| RepositoryError::DataCorruption(e.to_string()))?;
        let currency =
            Currency::parse(&self.currency).map_err(RepositoryError::DataCorruption)?;

        Ok(Order {
            id: OrderId::new(self.id),
            order_number: OrderNumber::from_stored(self.order_number),
            session_id: self.session_id,
            customer_id: CustomerId::new(self.customer_id),
            status,
            total: Money::new(self.total_amount, currency),
            items: items.into_iter().map(OrderItem::from).collect(),
            fulfillment_order_id: self.fulfillment_order_id,
            fulfillment_order_number: self.fulfillment_order_number,
            created_at: self.created_at,
        })
    }
}

const ORDER_COLUMNS: &str = "id, order_number, session_id, customer_id, status::text AS status, \
     total_amount, currency, fulfillment_order_id, fulfillment_order_number, created_at";

// =============================================================================
// Repository
// =============================================================================

/// Postgres-backed [`OrderStore`].
#[derive(Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Load an order by its payment session id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the data is invalid.
    pub async fn get_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let items = fetch_items(&mut conn, row.id).await?;
        row.into_order(items).map(Some)
    }

    async fn insert_order(
        tx: &mut Transaction<'_, Postgres>,
        order: &NewOrder,
    ) -> Result<Option<OrderRow>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            INSERT INTO orders (order_number, session_id, customer_id, status, total_amount, currency)
            VALUES ($1, $2, $3, 'pending', $4, $5)
            ON CONFLICT (session_id) DO NOTHING
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(order.order_number.as_str())
        .bind(&order.session_id)
        .bind(order.customer_id.as_i32())
        .bind(order.total.amount)
        .bind(order.total.currency.code())
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_constraint)?;

        let Some(row) = row else {
            return Ok(None);
        };

        for (position, item) in (1_i32..).zip(&order.items) {
            sqlx::query(
                r"
                INSERT INTO order_items
                    (order_id, position, sku, product_name, quantity, unit_price, variant_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ",
            )
            .bind(row.id)
            .bind(position)
            .bind(&item.sku)
            .bind(&item.product_name)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.variant_id.as_deref())
            .execute(&mut **tx)
            .await?;
        }

        Ok(Some(row))
    }
}

async fn fetch_items(
    conn: &mut sqlx::PgConnection,
    order_id: i32,
) -> Result<Vec<OrderItemRow>, RepositoryError> {
    let items = sqlx::query_as::<_, OrderItemRow>(
        r"
        SELECT id, sku, product_name, quantity, unit_price, variant_id
        FROM order_items
        WHERE order_id = $1
        ORDER BY position
        ",
    )
    .bind(order_id)
    .fetch_all(conn)
    .await?;
    Ok(items)
}

#[async_trait]
impl OrderStore for OrderRepository {
    async fn upsert_customer(&self, customer: &NewCustomer) -> Result<Customer, RepositoryError> {
        let row = sqlx::query_as::<_, CustomerRow>(
            r"
            INSERT INTO customers (email, first_name, last_name, phone)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO UPDATE SET
                first_name = COALESCE(EXCLUDED.first_name, customers.first_name),
                last_name = COALESCE(EXCLUDED.last_name, customers.last_name),
                phone = COALESCE(EXCLUDED.phone, customers.phone),
                updated_at = now()
            RETURNING id, email, first_name, last_name, phone
            ",
        )
        .bind(customer.email.as_str())
        .bind(customer.name.first.as_deref())
        .bind(customer.name.last.as_deref())
        .bind(customer.phone.as_deref())
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn create_order(&self, order: &NewOrder) -> Result<OrderCreation, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if let Some(row) = Self::insert_order(&mut tx, order).await? {
            let items = fetch_items(&mut tx, row.id).await?;
            tx.commit().await?;
            return row.into_order(items).map(OrderCreation::Created);
        }

        // A committed order already owns this session id.
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE session_id = $1"
        ))
        .bind(&order.session_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;
        let items = fetch_items(&mut tx, row.id).await?;
        tx.commit().await?;

        row.into_order(items).map(OrderCreation::Existing)
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<bool, RepositoryError> {
        let allowed: Vec<&str> = status
            .predecessors()
            .iter()
            .map(|s| s.as_str())
            .collect();

        let result = sqlx::query(
            r"
            UPDATE orders
            SET status = $2::order_status, updated_at = now()
            WHERE id = $1 AND status::text = ANY($3)
            ",
        )
        .bind(id.as_i32())
        .bind(status.as_str())
        .bind(allowed)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_fulfillment(
        &self,
        id: OrderId,
        receipt: &FulfillmentReceipt,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE orders
            SET fulfillment_order_id = $2, fulfillment_order_number = $3, updated_at = now()
            WHERE id = $1
            ",
        )
        .bind(id.as_i32())
        .bind(&receipt.external_order_id)
        .bind(receipt.external_order_number.as_deref())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
