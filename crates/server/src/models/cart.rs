//! Cart lines and the cart view returned by `/api/cart`.

use rust_decimal::Decimal;
use serde::Serialize;

use simonia_core::{Money, MoneyError, ProductId};

use super::product::Product;

/// One cart line joined with its product.
///
/// For guest carts `id` is the product id and `temp_id` is set, so the
/// storefront can address the line without a database row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub id: i32,
    pub product_id: ProductId,
    pub quantity: i32,
    pub product: Product,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
}

impl CartLine {
    /// Unit price times quantity.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Overflow`] if the line total does not fit.
    pub fn line_total(&self) -> Result<Money, MoneyError> {
        self.product.price_cents.checked_mul(self.quantity)
    }
}

/// Full cart as returned by the cart endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartView {
    pub items: Vec<CartLine>,
    pub subtotal_cents: Money,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    pub item_count: i32,
}

impl CartView {
    /// Build a view and its totals from lines.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Overflow`] if the subtotal does not fit.
    pub fn from_lines(items: Vec<CartLine>) -> Result<Self, MoneyError> {
        let subtotal_cents = items
            .iter()
            .map(CartLine::line_total)
            .try_fold(Money::ZERO, |acc, line| acc.checked_add(line?))?;
        let item_count = items
            .iter()
            .fold(0_i32, |acc, line| acc.saturating_add(line.quantity));

        Ok(Self {
            items,
            subtotal_cents,
            subtotal: subtotal_cents.to_decimal(),
            item_count,
        })
    }

    /// An empty cart.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            subtotal_cents: Money::ZERO,
            subtotal: Decimal::ZERO,
            item_count: 0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::product::fixtures::product;

    fn line(product_id: i32, cents: i64, quantity: i32) -> CartLine {
        CartLine {
            id: product_id,
            product_id: ProductId::new(product_id),
            quantity,
            product: product(product_id, cents),
            temp_id: Some(format!("guest-{product_id}")),
        }
    }

    #[test]
    fn test_view_totals() {
        let view = CartView::from_lines(vec![line(1, 35_000, 2), line(2, 160_000, 1)]).unwrap();
        assert_eq!(view.subtotal_cents.cents(), 230_000);
        assert_eq!(view.subtotal.to_string(), "2300.00");
        assert_eq!(view.item_count, 3);
    }

    #[test]
    fn test_view_overflow() {
        let result = CartView::from_lines(vec![line(1, i64::MAX / 2, 3)]);
        assert_eq!(result.unwrap_err(), MoneyError::Overflow);
    }

    #[test]
    fn test_line_json_is_camel_case() {
        let json = serde_json::to_value(line(4, 50_000, 1)).unwrap();
        assert_eq!(json["productId"], 4);
        assert_eq!(json["tempId"], "guest-4");
        assert!(json.get("product_id").is_none());

        let mut user_line = line(4, 50_000, 1);
        user_line.temp_id = None;
        let json = serde_json::to_value(user_line).unwrap();
        assert!(json.get("tempId").is_none());
    }

    #[test]
    fn test_empty_view() {
        let json = serde_json::to_value(CartView::empty()).unwrap();
        assert_eq!(json["items"], serde_json::json!([]));
        assert_eq!(json["subtotal_cents"], 0);
        assert_eq!(json["item_count"], 0);
    }
}
