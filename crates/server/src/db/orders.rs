//! Order repository.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use simonia_core::{Money, OrderId, OrderItemId, OrderStatus, Phone, ProductId, UserId};

use super::products::ProductRepository;
use super::{Page, RepositoryError, escape_like};
use crate::models::{Order, OrderItem, Product};

const ORDER_COLUMNS: &str = "id, user_id, name, phone, email, address, city, notes, status, \
     total_cents, email_sent, email_error, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    user_id: Option<UserId>,
    name: String,
    phone: String,
    email: String,
    address: String,
    city: String,
    notes: String,
    status: OrderStatus,
    total_cents: Money,
    email_sent: bool,
    email_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Order {
        Order {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            phone: self.phone,
            email: self.email,
            address: self.address,
            city: self.city,
            notes: self.notes,
            status: self.status,
            total: self.total_cents.to_decimal(),
            total_cents: self.total_cents,
            email_sent: self.email_sent,
            email_error: self.email_error,
            created_at: self.created_at,
            updated_at: self.updated_at,
            items,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    item_id: OrderItemId,
    order_id: OrderId,
    item_product_id: Option<ProductId>,
    product_name: String,
    quantity: i32,
    item_price_cents: Money,
}

impl OrderItemRow {
    fn into_item(self, product: Option<Product>) -> OrderItem {
        OrderItem {
            id: self.item_id,
            product_id: self.item_product_id,
            product_name: self.product_name,
            quantity: self.quantity,
            price: self.item_price_cents.to_decimal(),
            price_cents: self.item_price_cents,
            product,
        }
    }
}

/// Validated order ready to be written.
#[derive(Debug, Clone)]
pub struct NewOrder<'a> {
    pub user_id: Option<UserId>,
    pub name: &'a str,
    pub phone: &'a Phone,
    pub email: &'a str,
    pub address: &'a str,
    pub city: &'a str,
    pub notes: &'a str,
    pub total: Money,
    pub idempotency_key: Option<&'a str>,
    pub request_fingerprint: &'a str,
}

/// A priced line ready to be written.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Money,
}

/// Order fields editable from the back office. `None` leaves the column unchanged.
#[derive(Debug, Clone, Default)]
pub struct OrderUpdate {
    pub status: Option<OrderStatus>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub notes: Option<String>,
}

impl OrderUpdate {
    /// Whether the update changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.name.is_none()
            && self.phone.is_none()
            && self.email.is_none()
            && self.address.is_none()
            && self.city.is_none()
            && self.notes.is_none()
    }
}

/// Filters accepted by the admin order list.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub ids: Vec<OrderId>,
    pub q: Option<String>,
    pub status: Option<OrderStatus>,
    pub user_id: Option<UserId>,
}

/// An order already stored under an idempotency key.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IdempotentOrder {
    pub id: OrderId,
    pub request_fingerprint: Option<String>,
}

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get an order with its items.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let Some(row) = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
        else {
            return Ok(None);
        };

        let mut items = self.items_for(&[id]).await?;
        Ok(Some(row.into_order(items.remove(&id).unwrap_or_default())))
    }

    /// A user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(user_id)
            .fetch_all(self.pool)
            .await?;
        self.attach_items(rows).await
    }

    /// Look up an order by idempotency key outside a transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<IdempotentOrder>, RepositoryError> {
        let found = sqlx::query_as::<_, IdempotentOrder>(
            "SELECT id, request_fingerprint FROM orders WHERE idempotency_key = $1",
        )
        .bind(key)
        .fetch_optional(self.pool)
        .await?;
        Ok(found)
    }

    /// Apply back-office edits.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    pub async fn update(&self, id: OrderId, update: &OrderUpdate) -> Result<Order, RepositoryError> {
        if !update.is_empty() {
            let mut qb = QueryBuilder::<Postgres>::new("UPDATE orders SET ");
            let mut set = qb.separated(", ");
            if let Some(status) = update.status {
                set.push("status = ").push_bind_unseparated(status);
            }
            let text_fields = [
                ("name = ", &update.name),
                ("phone = ", &update.phone),
                ("email = ", &update.email),
                ("address = ", &update.address),
                ("city = ", &update.city),
                ("notes = ", &update.notes),
            ];
            for (column, value) in text_fields {
                if let Some(value) = value {
                    set.push(column).push_bind_unseparated(value.clone());
                }
            }
            qb.push(" WHERE id = ").push_bind(id);

            let result = qb.build().execute(self.pool).await?;
            if result.rows_affected() == 0 {
                return Err(RepositoryError::NotFound);
            }
        }

        self.get(id).await?.ok_or(RepositoryError::NotFound)
    }

    /// Delete an order and its items in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    pub async fn delete(&self, id: OrderId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        tx.commit().await?;
        Ok(())
    }

    /// Mirror the outcome of the notification email onto the order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn set_email_status(
        &self,
        id: OrderId,
        sent: bool,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE orders SET email_sent = $2, email_error = $3 WHERE id = $1")
            .bind(id)
            .bind(sent)
            .bind(error)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// One page of orders for the admin list, plus the total match count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_page(
        &self,
        filter: &OrderFilter,
        page: &Page,
    ) -> Result<(Vec<Order>, i64), RepositoryError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders");
        push_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(self.pool).await?;

        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {ORDER_COLUMNS} FROM orders"));
        push_filter(&mut select, filter);
        page.push_order_and_limit(&mut select, "id");
        let rows = select
            .build_query_as::<OrderRow>()
            .fetch_all(self.pool)
            .await?;

        Ok((self.attach_items(rows).await?, total))
    }

    async fn attach_items(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
        let ids: Vec<OrderId> = rows.iter().map(|row| row.id).collect();
        let mut items = self.items_for(&ids).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let order_items = items.remove(&row.id).unwrap_or_default();
                row.into_order(order_items)
            })
            .collect())
    }

    /// Items of several orders, grouped by order, with current product data.
    async fn items_for(
        &self,
        order_ids: &[OrderId],
    ) -> Result<HashMap<OrderId, Vec<OrderItem>>, RepositoryError> {
        if order_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, OrderItemRow>(
            r"
            SELECT id AS item_id, order_id, product_id AS item_product_id,
                   product_name, quantity, price_cents AS item_price_cents
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, id
            ",
        )
        .bind(order_ids)
        .fetch_all(self.pool)
        .await?;

        let mut product_ids: Vec<ProductId> =
            rows.iter().filter_map(|row| row.item_product_id).collect();
        product_ids.sort_unstable();
        product_ids.dedup();
        let products: HashMap<ProductId, Product> = ProductRepository::new(self.pool)
            .get_many(&product_ids)
            .await?
            .into_iter()
            .map(|product| (product.id, product))
            .collect();

        let mut grouped: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            let product = row
                .item_product_id
                .and_then(|id| products.get(&id).cloned());
            grouped
                .entry(row.order_id)
                .or_default()
                .push(row.into_item(product));
        }
        Ok(grouped)
    }
}

// =============================================================================
// Transaction-scoped operations
// =============================================================================

/// Insert an order header.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the idempotency key is already used.
pub async fn insert_order(
    conn: &mut PgConnection,
    order: &NewOrder<'_>,
) -> Result<OrderId, RepositoryError> {
    sqlx::query_scalar(
        r"
        INSERT INTO orders
            (user_id, name, phone, email, address, city, notes, total_cents,
             idempotency_key, request_fingerprint)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
        ",
    )
    .bind(order.user_id)
    .bind(order.name)
    .bind(order.phone.as_str())
    .bind(order.email)
    .bind(order.address)
    .bind(order.city)
    .bind(order.notes)
    .bind(order.total)
    .bind(order.idempotency_key)
    .bind(order.request_fingerprint)
    .fetch_one(conn)
    .await
    .map_err(|e| RepositoryError::unique_violation(e, "idempotency key already used"))
}

/// Insert the items of an order.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_items(
    conn: &mut PgConnection,
    order_id: OrderId,
    items: &[NewOrderItem],
) -> Result<(), RepositoryError> {
    if items.is_empty() {
        return Ok(());
    }

    let mut qb = QueryBuilder::<Postgres>::new(
        "INSERT INTO order_items (order_id, product_id, product_name, quantity, price_cents) ",
    );
    qb.push_values(items, |mut row, item| {
        row.push_bind(order_id)
            .push_bind(item.product_id)
            .push_bind(item.product_name.clone())
            .push_bind(item.quantity)
            .push_bind(item.unit_price);
    });
    qb.build().execute(conn).await?;
    Ok(())
}

/// Read back an order written in the caller's transaction.
///
/// Items carry their captured name and price but no product.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the order is not visible.
pub async fn fetch_placed(conn: &mut PgConnection, id: OrderId) -> Result<Order, RepositoryError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
    let row = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(RepositoryError::NotFound)?;

    let items = sqlx::query_as::<_, OrderItemRow>(
        r"
        SELECT id AS item_id, order_id, product_id AS item_product_id,
               product_name, quantity, price_cents AS item_price_cents
        FROM order_items
        WHERE order_id = $1
        ORDER BY id
        ",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(row.into_order(items.into_iter().map(|item| item.into_item(None)).collect()))
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
    qb.push(" WHERE TRUE");
    if !filter.ids.is_empty() {
        qb.push(" AND id = ANY(").push_bind(filter.ids.clone()).push(")");
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(user_id) = filter.user_id {
        qb.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(q) = filter.q.as_deref().filter(|q| !q.trim().is_empty()) {
        let pattern = format!("%{}%", escape_like(q.trim()));
        qb.push(" AND (unaccent(lower(name)) LIKE unaccent(lower(")
            .push_bind(pattern.clone())
            .push(")) OR phone LIKE ")
            .push_bind(pattern.clone())
            .push(" OR lower(email) LIKE lower(")
            .push_bind(pattern)
            .push("))");
    }
}
