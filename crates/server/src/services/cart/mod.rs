//! Cart service.
//!
//! Signed-in users keep their cart in `cart_items`; guests keep it in the
//! `guestCart` cookie ([`GuestCart`]). On login the guest cart is merged into
//! the user's cart exactly once per cart id.

pub mod guest;

pub use guest::{GUEST_CART_COOKIE, GuestCart, GuestLine, MAX_GUEST_LINES};

use std::collections::HashMap;

use axum::http::StatusCode;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;

use simonia_core::{CartItemId, MoneyError, ProductId, UserId};

use crate::db::cart::{self, LineInput, MAX_LINE_QUANTITY};
use crate::db::users;
use crate::db::{CartRepository, ProductRepository, RepositoryError};
use crate::models::{CartLine, CartView, Product};

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Quantity outside `1..=MAX_LINE_QUANTITY`.
    #[error("Quantity must be between 1 and {MAX_LINE_QUANTITY}")]
    InvalidQuantity,

    /// Product does not exist.
    #[error("Product not found")]
    ProductNotFound,

    /// Product exists but is not for sale.
    #[error("Product is not available")]
    ProductUnavailable,

    /// Cart line does not exist (or belongs to someone else).
    #[error("Cart item not found")]
    ItemNotFound,

    /// Guest cart is full.
    #[error("Cart cannot hold more than {MAX_GUEST_LINES} different products")]
    TooManyLines,

    /// Cart total does not fit in the money type.
    #[error("Cart total is too large")]
    TotalOverflow(#[from] MoneyError),

    /// User row disappeared mid-operation.
    #[error("User not found")]
    UserNotFound,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl CartError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidQuantity
            | Self::ProductUnavailable
            | Self::TooManyLines
            | Self::TotalOverflow(_) => StatusCode::BAD_REQUEST,
            Self::ProductNotFound | Self::ItemNotFound => StatusCode::NOT_FOUND,
            Self::UserNotFound => StatusCode::UNAUTHORIZED,
            Self::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
            Self::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the client.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::Repository(RepositoryError::NotFound) => "Not found".to_string(),
            Self::Repository(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Result of merging a guest cart into a user's cart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    /// Lines written to the user's cart.
    pub merged: usize,
    /// Lines dropped because their product no longer exists.
    pub skipped: usize,
    /// This guest cart had already been merged for this user.
    pub already_merged: bool,
}

/// Check a requested line quantity.
///
/// # Errors
///
/// Returns `CartError::InvalidQuantity` outside `1..=MAX_LINE_QUANTITY`.
pub const fn validate_quantity(quantity: i32) -> Result<i32, CartError> {
    if quantity >= 1 && quantity <= MAX_LINE_QUANTITY {
        Ok(quantity)
    } else {
        Err(CartError::InvalidQuantity)
    }
}

/// Sum duplicate products, keeping first-seen order and capping quantities.
#[must_use]
pub fn combine_lines(lines: impl IntoIterator<Item = LineInput>) -> Vec<LineInput> {
    let mut combined: Vec<LineInput> = Vec::new();
    for line in lines {
        if let Some(existing) = combined.iter_mut().find(|l| l.product_id == line.product_id) {
            existing.quantity = existing
                .quantity
                .saturating_add(line.quantity)
                .min(MAX_LINE_QUANTITY);
        } else {
            combined.push(line);
        }
    }
    combined
}

/// Cart service.
pub struct CartService<'a> {
    pool: &'a PgPool,
    carts: CartRepository<'a>,
    products: ProductRepository<'a>,
}

impl<'a> CartService<'a> {
    /// Create a new cart service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            pool,
            carts: CartRepository::new(pool),
            products: ProductRepository::new(pool),
        }
    }

    // =========================================================================
    // Signed-in users
    // =========================================================================

    /// The user's cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the query fails.
    pub async fn user_cart(&self, user_id: UserId) -> Result<CartView, CartError> {
        let lines = self.carts.lines(user_id).await?;
        Ok(CartView::from_lines(lines)?)
    }

    /// Add a product to the user's cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity`, `CartError::ProductNotFound` or
    /// `CartError::ProductUnavailable` for invalid input.
    pub async fn add_for_user(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<CartView, CartError> {
        let quantity = validate_quantity(quantity)?;
        self.purchasable(product_id).await?;
        self.carts.add(user_id, product_id, quantity).await?;
        self.user_cart(user_id).await
    }

    /// Set the quantity of one of the user's lines.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ItemNotFound` if the line is not the user's.
    pub async fn update_for_user(
        &self,
        user_id: UserId,
        item_id: CartItemId,
        quantity: i32,
    ) -> Result<CartView, CartError> {
        let quantity = validate_quantity(quantity)?;
        self.carts
            .set_quantity(user_id, item_id, quantity)
            .await
            .map_err(not_found_as_item)?;
        self.user_cart(user_id).await
    }

    /// Remove one of the user's lines. Removing an absent line is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the query fails.
    pub async fn remove_for_user(
        &self,
        user_id: UserId,
        item_id: CartItemId,
    ) -> Result<(), CartError> {
        match self.carts.remove(user_id, item_id).await {
            Ok(()) | Err(RepositoryError::NotFound) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Empty the user's cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the query fails.
    pub async fn clear_for_user(&self, user_id: UserId) -> Result<(), CartError> {
        self.carts.clear(user_id).await?;
        Ok(())
    }

    /// Replace the user's cart with `lines` in one transaction.
    ///
    /// Duplicate products are summed; unknown products are skipped.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity` if any quantity is out of range.
    pub async fn sync(
        &self,
        user_id: UserId,
        lines: Vec<LineInput>,
    ) -> Result<CartView, CartError> {
        for line in &lines {
            validate_quantity(line.quantity)?;
        }
        let lines = combine_lines(lines);

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        if !users::lock_user(&mut tx, user_id).await? {
            return Err(CartError::UserNotFound);
        }
        cart::delete_all(&mut tx, user_id).await?;
        let mut skipped = 0_usize;
        for line in &lines {
            if !cart::upsert_line(&mut tx, user_id, *line).await? {
                skipped += 1;
            }
        }
        tx.commit().await.map_err(RepositoryError::from)?;

        tracing::debug!(user_id = %user_id, lines = lines.len(), skipped, "Cart synced");
        self.user_cart(user_id).await
    }

    /// Merge a guest cart into the user's cart.
    ///
    /// Runs in one transaction holding the user row lock. The merge is
    /// recorded under the cart's merge key, so presenting the same guest cart
    /// again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the transaction fails.
    pub async fn merge_guest_cart(
        &self,
        user_id: UserId,
        guest: &GuestCart,
    ) -> Result<MergeOutcome, CartError> {
        if guest.is_empty() {
            return Ok(MergeOutcome::default());
        }

        let key = guest.merge_key();
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        if !users::lock_user(&mut tx, user_id).await? {
            return Err(CartError::UserNotFound);
        }
        if !cart::record_merge(&mut tx, user_id, &key).await? {
            tx.rollback().await.map_err(RepositoryError::from)?;
            tracing::debug!(user_id = %user_id, merge_key = %key, "Guest cart already merged");
            return Ok(MergeOutcome {
                already_merged: true,
                ..MergeOutcome::default()
            });
        }

        let mut outcome = MergeOutcome::default();
        for line in guest.lines() {
            let input = LineInput {
                product_id: line.product_id,
                quantity: line.quantity,
            };
            if cart::upsert_line(&mut tx, user_id, input).await? {
                outcome.merged += 1;
            } else {
                outcome.skipped += 1;
            }
        }
        tx.commit().await.map_err(RepositoryError::from)?;

        tracing::info!(
            user_id = %user_id,
            merged = outcome.merged,
            skipped = outcome.skipped,
            "Guest cart merged"
        );
        Ok(outcome)
    }

    // =========================================================================
    // Guests
    // =========================================================================

    /// Join a guest cart with current product data.
    ///
    /// Lines whose product no longer exists are dropped from `guest` as well,
    /// so the next cookie write forgets them.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the query fails.
    pub async fn guest_cart(&self, guest: &mut GuestCart) -> Result<CartView, CartError> {
        if guest.is_empty() {
            return Ok(CartView::empty());
        }

        let ids: Vec<ProductId> = guest.lines().iter().map(|l| l.product_id).collect();
        let products: HashMap<ProductId, Product> = self
            .products
            .get_many(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        guest.retain_products(|id| products.contains_key(&id));
        let lines = guest
            .lines()
            .iter()
            .filter_map(|line| {
                products.get(&line.product_id).map(|product| CartLine {
                    id: line.product_id.get(),
                    product_id: line.product_id,
                    quantity: line.quantity,
                    product: product.clone(),
                    temp_id: Some(format!("guest-{}", line.product_id)),
                })
            })
            .collect();
        Ok(CartView::from_lines(lines)?)
    }

    /// Add a product to a guest cart.
    ///
    /// # Errors
    ///
    /// Same as [`Self::add_for_user`], plus `CartError::TooManyLines`.
    pub async fn add_for_guest(
        &self,
        guest: &mut GuestCart,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<CartView, CartError> {
        let quantity = validate_quantity(quantity)?;
        self.purchasable(product_id).await?;
        guest.add(product_id, quantity)?;
        self.guest_cart(guest).await
    }

    /// Set the quantity of a guest line, addressed by product id.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ItemNotFound` if the product is not in the cart.
    pub async fn update_for_guest(
        &self,
        guest: &mut GuestCart,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<CartView, CartError> {
        let quantity = validate_quantity(quantity)?;
        guest.set_quantity(product_id, quantity)?;
        self.guest_cart(guest).await
    }

    async fn purchasable(&self, product_id: ProductId) -> Result<Product, CartError> {
        let product = self
            .products
            .get(product_id)
            .await?
            .ok_or(CartError::ProductNotFound)?;
        if !product.is_purchasable() {
            return Err(CartError::ProductUnavailable);
        }
        Ok(product)
    }
}

fn not_found_as_item(err: RepositoryError) -> CartError {
    match err {
        RepositoryError::NotFound => CartError::ItemNotFound,
        other => CartError::Repository(other),
    }
}
