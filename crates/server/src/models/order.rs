//! Orders and their captured line items.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use simonia_core::{Money, OrderId, OrderItemId, OrderStatus, ProductId, UserId};

use super::product::Product;

/// An order with its items.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: Option<UserId>,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub city: String,
    pub notes: String,
    pub status: OrderStatus,
    pub total_cents: Money,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    pub email_sent: bool,
    pub email_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

/// A line of an order.
///
/// `product_name` and `price_cents` are captured when the order is placed,
/// so the line stays meaningful after the product changes or is deleted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product_id: Option<ProductId>,
    pub product_name: String,
    pub quantity: i32,
    pub price_cents: Money,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub product: Option<Product>,
}

impl OrderItem {
    /// Captured unit price times quantity.
    ///
    /// Saturates instead of failing: totals were checked when the order was
    /// placed, this is only used for display.
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.price_cents
            .checked_mul(self.quantity)
            .unwrap_or(Money::from_cents(i64::MAX))
    }
}
