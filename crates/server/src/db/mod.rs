//! Database operations for the shop `PostgreSQL` schema.
//!
//! ## Tables
//!
//! - `categories`, `products` - Catalog
//! - `users` - Customer accounts (password and/or Google)
//! - `cart_items` - Persisted carts of signed-in users
//! - `merged_guest_carts` - Guest carts already merged into a user cart
//! - `orders`, `order_items` - Orders with captured prices
//! - `email_outbox` - Pending and delivered emails
//! - `tower_sessions.session` - Session store (created by `PostgresStore::migrate`)
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p simonia-cli -- migrate
//! ```

pub mod cart;
pub mod categories;
pub mod orders;
pub mod outbox;
pub mod products;
pub mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use cart::CartRepository;
pub use categories::{CategoryFilter, CategoryRepository};
pub use orders::{OrderFilter, OrderRepository};
pub use outbox::OutboxRepository;
pub use products::{ProductFilter, ProductRepository};
pub use users::{UserFilter, UserRepository};

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

    /// Constraint violation (e.g., unique email).
    #[error("{0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map a unique violation to `Conflict`, keeping other errors as `Database`.
    pub(crate) fn unique_violation(err: sqlx::Error, message: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.is_unique_violation()
        {
            return Self::Conflict(message.to_owned());
        }
        Self::Database(err)
    }
}

/// One page of an admin list query.
///
/// `sort_column` always comes from a per-resource whitelist, never from
/// user input, so it is safe to splice into SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: i64,
    pub limit: i64,
    pub sort_column: &'static str,
    pub descending: bool,
}

impl Page {
    /// Append `ORDER BY`, a stable `id_column` tiebreak, `LIMIT` and `OFFSET`.
    pub(crate) fn push_order_and_limit(
        &self,
        qb: &mut sqlx::QueryBuilder<'_, sqlx::Postgres>,
        id_column: &'static str,
    ) {
        qb.push(" ORDER BY ")
            .push(self.sort_column)
            .push(if self.descending { " DESC" } else { " ASC" })
            .push(", ")
            .push(id_column)
            .push(" ASC LIMIT ")
            .push_bind(self.limit)
            .push(" OFFSET ")
            .push_bind(self.offset);
    }
}

/// Escape `%`, `_` and `\` so user text matches literally inside `LIKE`.
#[must_use]
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("canapea"), "canapea");
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn test_page_sql() {
        let page = Page {
            offset: 10,
            limit: 10,
            sort_column: "name",
            descending: true,
        };
        let mut qb = sqlx::QueryBuilder::<sqlx::Postgres>::new("SELECT * FROM categories");
        page.push_order_and_limit(&mut qb, "id");
        assert_eq!(
            qb.sql(),
            "SELECT * FROM categories ORDER BY name DESC, id ASC LIMIT $1 OFFSET $2"
        );
    }
}
