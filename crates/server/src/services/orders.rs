//! Order placement.
//!
//! An order is written in a single transaction: prices are read with
//! `FOR SHARE`, the order and its items are inserted, the customer's phone is
//! updated and the shop notification is put in the email outbox. Clients may
//! send an `Idempotency-Key` header to make retries safe.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use thiserror::Error;

use simonia_core::{Email, EmailError, Money, MoneyError, Phone, PhoneError, ProductId, UserId};

use crate::db::cart::MAX_LINE_QUANTITY;
use crate::db::orders::{self, IdempotentOrder, NewOrder, NewOrderItem, OrderRepository};
use crate::db::products::lock_prices;
use crate::db::{RepositoryError, outbox, users};
use crate::models::{CurrentUser, Order};
use crate::services::auth::capitalize;
use crate::services::email::{EmailService, MailError};

/// Longest accepted `Idempotency-Key`.
const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Longest accepted value of a free-text order field.
const MAX_FIELD_LEN: usize = 500;

/// Longest accepted order note.
const MAX_NOTES_LEN: usize = 2000;

/// Errors from order placement.
#[derive(Debug, Error)]
pub enum OrderError {
    /// A required field is blank.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// A field is longer than allowed.
    #[error("{0} is too long")]
    FieldTooLong(&'static str),

    /// Invalid phone number.
    #[error("{}", phone_message(.0))]
    InvalidPhone(#[from] PhoneError),

    /// Invalid email address.
    #[error("Invalid email address")]
    InvalidEmail(#[from] EmailError),

    /// No items.
    #[error("Order must contain at least one item")]
    EmptyOrder,

    /// Quantity outside `1..=MAX_LINE_QUANTITY`.
    #[error("Quantity must be between 1 and {MAX_LINE_QUANTITY}")]
    InvalidQuantity,

    /// Product does not exist.
    #[error("Product with ID {0} does not exist")]
    ProductNotFound(ProductId),

    /// Product exists but is not for sale.
    #[error("Product with ID {0} is not available")]
    ProductUnavailable(ProductId),

    /// Total does not fit in the money type.
    #[error("Order total is too large")]
    TotalOverflow(#[from] MoneyError),

    /// Malformed `Idempotency-Key` header.
    #[error("Idempotency-Key must be 1 to {MAX_IDEMPOTENCY_KEY_LEN} visible ASCII characters")]
    InvalidIdempotencyKey,

    /// Key reused with a different request.
    #[error("Idempotency-Key was already used with a different request")]
    IdempotencyConflict,

    /// Notification could not be rendered.
    #[error("email error: {0}")]
    Mail(#[from] MailError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl OrderError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::IdempotencyConflict => StatusCode::CONFLICT,
            Self::Mail(_) | Self::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Message safe to show to the client.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::Mail(_) | Self::Repository(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

/// One requested line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineRequest {
    pub product_id: ProductId,
    pub quantity: i32,
}

/// Body of `POST /api/orders`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OrderRequest {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub city: String,
    pub notes: String,
    pub items: Vec<OrderLineRequest>,
}

/// A validated order request in canonical form.
///
/// Items are merged by product and sorted by product id, so requests that
/// differ only in line order or duplicate splitting are equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidOrder {
    pub user_id: Option<UserId>,
    pub name: String,
    pub phone: Phone,
    pub email: String,
    pub address: String,
    pub city: String,
    pub notes: String,
    pub items: Vec<OrderLineRequest>,
}

impl ValidOrder {
    /// Validate a request. Signed-in customers default to their account email.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    pub fn parse(request: OrderRequest, account: Option<&CurrentUser>) -> Result<Self, OrderError> {
        let name = required(&request.name, "Name")?;
        let phone = Phone::parse(&request.phone)?;

        let email = match request.email.trim() {
            "" => account.map(|a| a.email.to_string()).unwrap_or_default(),
            raw => Email::parse(raw)?.into_inner(),
        };

        let address = bounded(&request.address, "Address", MAX_FIELD_LEN)?;
        let city = bounded(&request.city, "City", MAX_FIELD_LEN)?;
        let notes = bounded(&request.notes, "Notes", MAX_NOTES_LEN)?;

        Ok(Self {
            user_id: account.map(|a| a.id),
            name,
            phone,
            email,
            address,
            city,
            notes,
            items: canonical_items(&request.items)?,
        })
    }

    /// Stable hash of the request, stored with the idempotency key.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&canonical))
    }

    fn product_ids(&self) -> Vec<ProductId> {
        self.items.iter().map(|item| item.product_id).collect()
    }
}

fn phone_message(err: &PhoneError) -> String {
    capitalize(&err.to_string())
}

fn required(value: &str, field: &'static str) -> Result<String, OrderError> {
    let value = bounded(value, field, MAX_FIELD_LEN)?;
    if value.is_empty() {
        return Err(OrderError::MissingField(field));
    }
    Ok(value)
}

fn bounded(value: &str, field: &'static str, max: usize) -> Result<String, OrderError> {
    let value = value.trim();
    if value.chars().count() > max {
        return Err(OrderError::FieldTooLong(field));
    }
    Ok(value.to_string())
}

/// Validate quantities, merge duplicates and sort by product id.
fn canonical_items(items: &[OrderLineRequest]) -> Result<Vec<OrderLineRequest>, OrderError> {
    if items.is_empty() {
        return Err(OrderError::EmptyOrder);
    }

    let mut merged: Vec<OrderLineRequest> = Vec::with_capacity(items.len());
    for item in items {
        if !(1..=MAX_LINE_QUANTITY).contains(&item.quantity) {
            return Err(OrderError::InvalidQuantity);
        }
        if let Some(line) = merged.iter_mut().find(|l| l.product_id == item.product_id) {
            line.quantity = line
                .quantity
                .checked_add(item.quantity)
                .filter(|q| *q <= MAX_LINE_QUANTITY)
                .ok_or(OrderError::InvalidQuantity)?;
        } else {
            merged.push(*item);
        }
    }
    merged.sort_by_key(|line| line.product_id);
    Ok(merged)
}

/// Validate an `Idempotency-Key` header value.
///
/// # Errors
///
/// Returns `OrderError::InvalidIdempotencyKey` unless the key is 1 to 255
/// visible ASCII characters.
pub fn parse_idempotency_key(raw: &[u8]) -> Result<String, OrderError> {
    let valid = !raw.is_empty()
        && raw.len() <= MAX_IDEMPOTENCY_KEY_LEN
        && raw.iter().all(u8::is_ascii_graphic);
    if !valid {
        return Err(OrderError::InvalidIdempotencyKey);
    }
    String::from_utf8(raw.to_vec()).map_err(|_| OrderError::InvalidIdempotencyKey)
}

/// Outcome of [`OrderService::place`].
#[derive(Debug, Clone)]
pub enum PlacedOrder {
    /// A new order was written.
    Created(Order),
    /// The idempotency key matched an earlier identical request.
    Replayed(Order),
}

/// Order service.
pub struct OrderService<'a> {
    pool: &'a PgPool,
    orders: OrderRepository<'a>,
    email: &'a EmailService,
}

impl<'a> OrderService<'a> {
    /// Create a new order service.
    #[must_use]
    pub const fn new(pool: &'a PgPool, email: &'a EmailService) -> Self {
        Self {
            pool,
            orders: OrderRepository::new(pool),
            email,
        }
    }

    /// Place an order.
    ///
    /// With an idempotency key, a repeat of the same request returns the
    /// original order; a different request under the same key is rejected.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::ProductNotFound`/`ProductUnavailable` for bad
    /// items, `OrderError::TotalOverflow` for absurd totals and
    /// `OrderError::IdempotencyConflict` for reused keys.
    pub async fn place(
        &self,
        order: &ValidOrder,
        idempotency_key: Option<&str>,
    ) -> Result<PlacedOrder, OrderError> {
        let fingerprint = order.fingerprint();

        if let Some(key) = idempotency_key
            && let Some(existing) = self.orders.find_by_idempotency_key(key).await?
        {
            return self.replay(&existing, &fingerprint).await;
        }

        match self.insert(order, idempotency_key, &fingerprint).await {
            Ok(id) => {
                let placed = self.load(id).await?;
                tracing::info!(
                    order_id = %placed.id,
                    total = %placed.total_cents,
                    items = placed.items.len(),
                    "Order placed"
                );
                Ok(PlacedOrder::Created(placed))
            }
            // Lost a race with a concurrent request using the same key.
            Err(OrderError::Repository(RepositoryError::Conflict(_))) if idempotency_key.is_some() => {
                let key = idempotency_key.unwrap_or_default();
                let existing = self
                    .orders
                    .find_by_idempotency_key(key)
                    .await?
                    .ok_or(RepositoryError::NotFound)?;
                self.replay(&existing, &fingerprint).await
            }
            Err(e) => Err(e),
        }
    }

    /// A customer's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, OrderError> {
        Ok(self.orders.list_for_user(user_id).await?)
    }

    async fn insert(
        &self,
        order: &ValidOrder,
        idempotency_key: Option<&str>,
        fingerprint: &str,
    ) -> Result<simonia_core::OrderId, OrderError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let priced = lock_prices(&mut tx, &order.product_ids()).await?;
        let mut items = Vec::with_capacity(order.items.len());
        for line in &order.items {
            let product = priced
                .iter()
                .find(|p| p.id == line.product_id)
                .ok_or(OrderError::ProductNotFound(line.product_id))?;
            if !product.is_active {
                return Err(OrderError::ProductUnavailable(line.product_id));
            }
            items.push(NewOrderItem {
                product_id: product.id,
                product_name: product.name.clone(),
                quantity: line.quantity,
                unit_price: product.price_cents,
            });
        }
        let total = order_total(&items)?;

        let order_id = orders::insert_order(
            &mut tx,
            &NewOrder {
                user_id: order.user_id,
                name: &order.name,
                phone: &order.phone,
                email: &order.email,
                address: &order.address,
                city: &order.city,
                notes: &order.notes,
                total,
                idempotency_key,
                request_fingerprint: fingerprint,
            },
        )
        .await?;
        orders::insert_items(&mut tx, order_id, &items).await?;

        if let Some(user_id) = order.user_id {
            users::update_phone(&mut tx, user_id, &order.phone).await?;
        }

        let placed = orders::fetch_placed(&mut tx, order_id).await?;
        let notification = self.email.order_notification(&placed)?;
        outbox::enqueue(&mut tx, &notification).await?;

        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(order_id)
    }

    async fn replay(
        &self,
        existing: &IdempotentOrder,
        fingerprint: &str,
    ) -> Result<PlacedOrder, OrderError> {
        if existing.request_fingerprint.as_deref() != Some(fingerprint) {
            tracing::warn!(order_id = %existing.id, "Idempotency key reused with a different request");
            return Err(OrderError::IdempotencyConflict);
        }
        tracing::debug!(order_id = %existing.id, "Replaying idempotent order");
        Ok(PlacedOrder::Replayed(self.load(existing.id).await?))
    }

    async fn load(&self, id: simonia_core::OrderId) -> Result<Order, OrderError> {
        Ok(self
            .orders
            .get(id)
            .await?
            .ok_or(RepositoryError::NotFound)?)
    }
}

/// Sum of unit price times quantity, with overflow checks.
fn order_total(items: &[NewOrderItem]) -> Result<Money, MoneyError> {
    let line_totals = items
        .iter()
        .map(|item| item.unit_price.checked_mul(item.quantity))
        .collect::<Result<Vec<_>, _>>()?;
    Money::checked_sum(line_totals)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn line(product_id: i32, quantity: i32) -> OrderLineRequest {
        OrderLineRequest {
            product_id: ProductId::new(product_id),
            quantity,
        }
    }

    fn request() -> OrderRequest {
        OrderRequest {
            name: " Ion Popescu ".to_string(),
            phone: "+37369123456".to_string(),
            email: "Ion@Mail.md".to_string(),
            address: "Str. Independentei 5".to_string(),
            city: "Chisinau".to_string(),
            notes: String::new(),
            items: vec![line(3, 1), line(1, 2)],
        }
    }

    fn item(cents: i64, quantity: i32) -> NewOrderItem {
        NewOrderItem {
            product_id: ProductId::new(1),
            product_name: "Canapea".to_string(),
            quantity,
            unit_price: Money::from_cents(cents),
        }
    }

    #[test]
    fn test_parse_normalizes() {
        let order = ValidOrder::parse(request(), None).unwrap();
        assert_eq!(order.name, "Ion Popescu");
        assert_eq!(order.email, "ion@mail.md");
        assert_eq!(order.items, vec![line(1, 2), line(3, 1)]);
        assert_eq!(order.user_id, None);
    }

    #[test]
    fn test_parse_requires_phone() {
        let mut req = request();
        req.phone = "  ".to_string();
        let err = ValidOrder::parse(req, None).unwrap_err();
        assert!(matches!(err, OrderError::InvalidPhone(PhoneError::Empty)));
        assert_eq!(err.to_string(), "Phone number is required");
    }

    #[test]
    fn test_parse_rejects_bad_phone() {
        let mut req = request();
        req.phone = "069-123-456".to_string();
        assert!(matches!(
            ValidOrder::parse(req, None),
            Err(OrderError::InvalidPhone(PhoneError::Invalid))
        ));
    }

    #[test]
    fn test_parse_requires_name_and_items() {
        let mut req = request();
        req.name = String::new();
        assert!(matches!(
            ValidOrder::parse(req, None),
            Err(OrderError::MissingField("Name"))
        ));

        let mut req = request();
        req.items.clear();
        assert!(matches!(
            ValidOrder::parse(req, None),
            Err(OrderError::EmptyOrder)
        ));
    }

    #[test]
    fn test_parse_quantity_bounds() {
        for quantity in [0, -1, 1000] {
            let mut req = request();
            req.items = vec![line(1, quantity)];
            assert!(matches!(
                ValidOrder::parse(req, None),
                Err(OrderError::InvalidQuantity)
            ));
        }

        let mut req = request();
        req.items = vec![line(1, 500), line(1, 500)];
        assert!(matches!(
            ValidOrder::parse(req, None),
            Err(OrderError::InvalidQuantity)
        ));
    }

    #[test]
    fn test_parse_merges_duplicates() {
        let mut req = request();
        req.items = vec![line(2, 1), line(5, 1), line(2, 3)];
        let order = ValidOrder::parse(req, None).unwrap();
        assert_eq!(order.items, vec![line(2, 4), line(5, 1)]);
    }

    #[test]
    fn test_parse_defaults_to_account_email() {
        let account = CurrentUser {
            id: UserId::new(9),
            email: Email::parse("ana@mail.md").unwrap(),
        };
        let mut req = request();
        req.email = String::new();
        let order = ValidOrder::parse(req, Some(&account)).unwrap();
        assert_eq!(order.email, "ana@mail.md");
        assert_eq!(order.user_id, Some(UserId::new(9)));
    }

    #[test]
    fn test_parse_guest_without_email() {
        let mut req = request();
        req.email = String::new();
        let order = ValidOrder::parse(req, None).unwrap();
        assert_eq!(order.email, "");
    }

    #[test]
    fn test_fingerprint_ignores_line_order_and_splitting() {
        let a = ValidOrder::parse(request(), None).unwrap();

        let mut req = request();
        req.items = vec![line(1, 1), line(3, 1), line(1, 1)];
        let b = ValidOrder::parse(req, None).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let mut req = request();
        req.items = vec![line(1, 3), line(3, 1)];
        let c = ValidOrder::parse(req, None).unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_fingerprint_depends_on_customer() {
        let account = CurrentUser {
            id: UserId::new(1),
            email: Email::parse("ion@mail.md").unwrap(),
        };
        let guest = ValidOrder::parse(request(), None).unwrap();
        let user = ValidOrder::parse(request(), Some(&account)).unwrap();
        assert_ne!(guest.fingerprint(), user.fingerprint());
        assert_eq!(guest.fingerprint().len(), 64);
    }

    #[test]
    fn test_idempotency_key() {
        assert_eq!(parse_idempotency_key(b"order-123").unwrap(), "order-123");
        assert!(parse_idempotency_key(b"").is_err());
        assert!(parse_idempotency_key(b"has space").is_err());
        assert!(parse_idempotency_key("cheie-ă".as_bytes()).is_err());
        assert!(parse_idempotency_key(&[b'k'; 255]).is_ok());
        assert!(parse_idempotency_key(&[b'k'; 256]).is_err());
    }

    #[test]
    fn test_order_total() {
        let total = order_total(&[item(35_000, 2), item(160_000, 1)]).unwrap();
        assert_eq!(total, Money::from_cents(230_000));
    }

    #[test]
    fn test_order_total_overflow() {
        assert_eq!(
            order_total(&[item(i64::MAX / 2, 3)]),
            Err(MoneyError::Overflow)
        );
        assert_eq!(
            order_total(&[item(i64::MAX / 2, 1), item(i64::MAX / 2, 1), item(2, 1)]),
            Err(MoneyError::Overflow)
        );
    }

    #[test]
    fn test_error_statuses() {
        assert_eq!(
            OrderError::ProductNotFound(ProductId::new(7)).to_string(),
            "Product with ID 7 does not exist"
        );
        assert_eq!(
            OrderError::ProductNotFound(ProductId::new(7)).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(OrderError::IdempotencyConflict.status(), StatusCode::CONFLICT);
        assert_eq!(
            OrderError::TotalOverflow(MoneyError::Overflow).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
