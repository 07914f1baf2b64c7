//! Cart repository for signed-in users.
//!
//! Guest carts live in a cookie and never touch this table until they are
//! merged at login.

use sqlx::{PgConnection, PgPool};

use simonia_core::{CartItemId, ProductId, UserId};

use super::RepositoryError;
use super::products::{PRODUCT_COLUMNS, ProductRow};
use crate::models::{CartLine, Product};

/// Upper bound on the quantity of one cart line.
pub const MAX_LINE_QUANTITY: i32 = 999;

/// A cart line row joined with its product.
#[derive(Debug, sqlx::FromRow)]
struct CartLineRow {
    line_id: CartItemId,
    line_quantity: i32,
    #[sqlx(flatten)]
    product: ProductRow,
}

impl From<CartLineRow> for CartLine {
    fn from(row: CartLineRow) -> Self {
        let product = Product::from(row.product);
        Self {
            id: row.line_id.get(),
            product_id: product.id,
            quantity: row.line_quantity,
            product,
            temp_id: None,
        }
    }
}

/// A `(product, quantity)` pair to write into a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineInput {
    pub product_id: ProductId,
    pub quantity: i32,
}

/// Repository for persisted cart operations.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Lines of a user's cart, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lines(&self, user_id: UserId) -> Result<Vec<CartLine>, RepositoryError> {
        let sql = format!(
            "SELECT ci.id AS line_id, ci.quantity AS line_quantity, {PRODUCT_COLUMNS} \
             FROM cart_items ci \
             JOIN products p ON p.id = ci.product_id \
             LEFT JOIN categories c ON c.id = p.category_id \
             WHERE ci.user_id = $1 \
             ORDER BY ci.id"
        );
        let rows = sqlx::query_as::<_, CartLineRow>(&sql)
            .bind(user_id)
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().map(CartLine::from).collect())
    }

    /// Add `quantity` of a product, incrementing an existing line.
    ///
    /// The result is capped at [`MAX_LINE_QUANTITY`].
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn add(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<CartItemId, RepositoryError> {
        let id: CartItemId = sqlx::query_scalar(
            r"
            INSERT INTO cart_items (user_id, product_id, quantity)
            VALUES ($1, $2, LEAST($3, $4))
            ON CONFLICT (user_id, product_id)
            DO UPDATE SET quantity = LEAST(cart_items.quantity + EXCLUDED.quantity, $4)
            RETURNING id
            ",
        )
        .bind(user_id)
        .bind(product_id)
        .bind(quantity)
        .bind(MAX_LINE_QUANTITY)
        .fetch_one(self.pool)
        .await?;
        Ok(id)
    }

    /// Set the quantity of one of the user's lines.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the line does not belong to the user.
    pub async fn set_quantity(
        &self,
        user_id: UserId,
        item_id: CartItemId,
        quantity: i32,
    ) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE cart_items SET quantity = $3 WHERE id = $1 AND user_id = $2")
                .bind(item_id)
                .bind(user_id)
                .bind(quantity)
                .execute(self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Remove one of the user's lines.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the line does not belong to the user.
    pub async fn remove(&self, user_id: UserId, item_id: CartItemId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND user_id = $2")
            .bind(item_id)
            .bind(user_id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Remove every line of the user's cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn clear(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// =============================================================================
// Transaction-scoped operations
// =============================================================================

/// Delete every line of a user's cart inside the caller's transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn delete_all(conn: &mut PgConnection, user_id: UserId) -> Result<u64, RepositoryError> {
    let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// Add a line, summing with any existing line and capping at [`MAX_LINE_QUANTITY`].
///
/// Lines for products that no longer exist are skipped; returns whether a
/// row was written.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn upsert_line(
    conn: &mut PgConnection,
    user_id: UserId,
    line: LineInput,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        r"
        INSERT INTO cart_items (user_id, product_id, quantity)
        SELECT $1, p.id, LEAST($3, $4)
        FROM products p
        WHERE p.id = $2
        ON CONFLICT (user_id, product_id)
        DO UPDATE SET quantity = LEAST(cart_items.quantity + EXCLUDED.quantity, $4)
        ",
    )
    .bind(user_id)
    .bind(line.product_id)
    .bind(line.quantity)
    .bind(MAX_LINE_QUANTITY)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Record that a guest cart was merged into a user's cart.
///
/// Returns `false` if this `(user, key)` pair was already recorded.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn record_merge(
    conn: &mut PgConnection,
    user_id: UserId,
    guest_cart_key: &str,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        r"
        INSERT INTO merged_guest_carts (user_id, guest_cart_key)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        ",
    )
    .bind(user_id)
    .bind(guest_cart_key)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}
