//! Product repository.
//!
//! Products are always loaded joined with their category so that every
//! response can embed `category {id, name}`.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use simonia_core::{CategoryId, Money, ProductId};

use super::{Page, RepositoryError, escape_like};
use crate::models::{CategoryRef, Product};

/// Columns selected for a [`ProductRow`]; `p` is `products`, `c` is `categories`.
pub(crate) const PRODUCT_COLUMNS: &str = "p.id, p.name, p.description, p.price_cents, \
     p.image_urls, p.dimensions, p.is_active, p.is_available, p.category_id, \
     c.name AS category_name, p.created_at, p.updated_at";

const PRODUCT_FROM: &str = " FROM products p LEFT JOIN categories c ON c.id = p.category_id";

/// Flat product row joined with its category name.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ProductRow {
    id: ProductId,
    name: String,
    description: String,
    price_cents: Money,
    image_urls: Vec<String>,
    dimensions: Option<String>,
    is_active: bool,
    is_available: bool,
    category_id: Option<CategoryId>,
    category_name: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        let category = row
            .category_id
            .zip(row.category_name)
            .map(|(id, name)| CategoryRef { id, name });

        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            price: row.price_cents.to_decimal(),
            price_cents: row.price_cents,
            image_urls: row.image_urls,
            dimensions: row.dimensions,
            is_active: row.is_active,
            is_available: row.is_available,
            category_id: row.category_id,
            category,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Fields for a new product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: Money,
    pub image_urls: Vec<String>,
    pub dimensions: Option<String>,
    pub is_active: bool,
    pub is_available: bool,
    pub category_id: Option<CategoryId>,
}

/// Partial product update; `None` leaves the column unchanged.
///
/// `category_id` and `dimensions` are doubly optional: `Some(None)` clears them.
#[derive(Debug, Clone, Default)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub image_urls: Option<Vec<String>>,
    pub dimensions: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub is_available: Option<bool>,
    pub category_id: Option<Option<CategoryId>>,
}

impl ProductUpdate {
    /// Whether the update changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.image_urls.is_none()
            && self.dimensions.is_none()
            && self.is_active.is_none()
            && self.is_available.is_none()
            && self.category_id.is_none()
    }
}

/// Filters accepted by the admin product list.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub ids: Vec<ProductId>,
    pub q: Option<String>,
    pub category_id: Option<CategoryId>,
    pub is_active: Option<bool>,
}

/// Repository for product database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Active products with their category, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_active(&self) -> Result<Vec<Product>, RepositoryError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS}{PRODUCT_FROM} WHERE p.is_active ORDER BY p.id");
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    /// Accent- and case-insensitive substring search over active products.
    ///
    /// A blank query returns every active product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn search(&self, query: &str) -> Result<Vec<Product>, RepositoryError> {
        let query = query.trim();
        if query.is_empty() {
            return self.list_active().await;
        }

        let sql = format!(
            "SELECT {PRODUCT_COLUMNS}{PRODUCT_FROM} \
             WHERE p.is_active \
               AND (unaccent(lower(p.name)) LIKE unaccent(lower($1)) \
                    OR unaccent(lower(p.description)) LIKE unaccent(lower($1))) \
             ORDER BY p.id"
        );
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(format!("%{}%", escape_like(query)))
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    /// Get a product by ID, active or not.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS}{PRODUCT_FROM} WHERE p.id = $1");
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(Product::from))
    }

    /// Get several products by ID; missing IDs are simply absent.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql =
            format!("SELECT {PRODUCT_COLUMNS}{PRODUCT_FROM} WHERE p.id = ANY($1) ORDER BY p.id");
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(ids)
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    /// Find a product by exact name (used by the catalog seeder).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Product>, RepositoryError> {
        let sql =
            format!("SELECT {PRODUCT_COLUMNS}{PRODUCT_FROM} WHERE p.name = $1 ORDER BY p.id LIMIT 1");
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(name)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(Product::from))
    }

    /// Insert a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(&self, product: &NewProduct) -> Result<Product, RepositoryError> {
        let id: ProductId = sqlx::query_scalar(
            r"
            INSERT INTO products
                (name, description, price_cents, image_urls, dimensions,
                 is_active, is_available, category_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            ",
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(&product.image_urls)
        .bind(&product.dimensions)
        .bind(product.is_active)
        .bind(product.is_available)
        .bind(product.category_id)
        .fetch_one(self.pool)
        .await?;

        self.get(id).await?.ok_or(RepositoryError::NotFound)
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn update(
        &self,
        id: ProductId,
        update: &ProductUpdate,
    ) -> Result<Product, RepositoryError> {
        if !update.is_empty() {
            let mut qb = QueryBuilder::<Postgres>::new("UPDATE products SET ");
            let mut set = qb.separated(", ");
            if let Some(name) = &update.name {
                set.push("name = ").push_bind_unseparated(name.clone());
            }
            if let Some(description) = &update.description {
                set.push("description = ")
                    .push_bind_unseparated(description.clone());
            }
            if let Some(price) = update.price {
                set.push("price_cents = ").push_bind_unseparated(price);
            }
            if let Some(image_urls) = &update.image_urls {
                set.push("image_urls = ")
                    .push_bind_unseparated(image_urls.clone());
            }
            if let Some(dimensions) = &update.dimensions {
                set.push("dimensions = ")
                    .push_bind_unseparated(dimensions.clone());
            }
            if let Some(is_active) = update.is_active {
                set.push("is_active = ").push_bind_unseparated(is_active);
            }
            if let Some(is_available) = update.is_available {
                set.push("is_available = ").push_bind_unseparated(is_available);
            }
            if let Some(category_id) = update.category_id {
                set.push("category_id = ").push_bind_unseparated(category_id);
            }
            qb.push(" WHERE id = ").push_bind(id);

            let result = qb.build().execute(self.pool).await?;
            if result.rows_affected() == 0 {
                return Err(RepositoryError::NotFound);
            }
        }

        self.get(id).await?.ok_or(RepositoryError::NotFound)
    }

    /// Delete a product. Cart lines go with it; order items keep their captured name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn delete(&self, id: ProductId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// One page of products for the admin list, plus the total match count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_page(
        &self,
        filter: &ProductFilter,
        page: &Page,
    ) -> Result<(Vec<Product>, i64), RepositoryError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products p");
        push_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {PRODUCT_COLUMNS}{PRODUCT_FROM}"
        ));
        push_filter(&mut select, filter);
        page.push_order_and_limit(&mut select, "p.id");
        let rows = select
            .build_query_as::<ProductRow>()
            .fetch_all(self.pool)
            .await?;

        Ok((rows.into_iter().map(Product::from).collect(), total))
    }
}

/// Snapshot of a product's price and state, locked for the current transaction.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PricedProduct {
    pub id: ProductId,
    pub name: String,
    pub price_cents: Money,
    pub is_active: bool,
}

/// Read prices for `ids` with `FOR SHARE`, so they cannot change until commit.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_prices(
    conn: &mut PgConnection,
    ids: &[ProductId],
) -> Result<Vec<PricedProduct>, RepositoryError> {
    let rows = sqlx::query_as::<_, PricedProduct>(
        r"
        SELECT id, name, price_cents, is_active
        FROM products
        WHERE id = ANY($1)
        ORDER BY id
        FOR SHARE
        ",
    )
    .bind(ids)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    qb.push(" WHERE TRUE");
    if !filter.ids.is_empty() {
        qb.push(" AND p.id = ANY(")
            .push_bind(filter.ids.clone())
            .push(")");
    }
    if let Some(q) = filter.q.as_deref().filter(|q| !q.trim().is_empty()) {
        let pattern = format!("%{}%", escape_like(q.trim()));
        qb.push(" AND (unaccent(lower(p.name)) LIKE unaccent(lower(")
            .push_bind(pattern.clone())
            .push(")) OR unaccent(lower(p.description)) LIKE unaccent(lower(")
            .push_bind(pattern)
            .push(")))");
    }
    if let Some(category_id) = filter.category_id {
        qb.push(" AND p.category_id = ").push_bind(category_id);
    }
    if let Some(is_active) = filter.is_active {
        qb.push(" AND p.is_active = ").push_bind(is_active);
    }
}
