//! Catalog product.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use simonia_core::{CategoryId, Money, ProductId};

use super::category::CategoryRef;

/// A catalog product.
///
/// `price` is the decimal rendering of `price_cents` for clients that
/// display it directly; it is derived on load and never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price_cents: Money,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub image_urls: Vec<String>,
    pub dimensions: Option<String>,
    pub is_active: bool,
    pub is_available: bool,
    pub category_id: Option<CategoryId>,
    pub category: Option<CategoryRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether the product can be put in a cart or ordered.
    #[must_use]
    pub const fn is_purchasable(&self) -> bool {
        self.is_active
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod fixtures {
    use super::*;

    /// A product priced at `cents`, active, in no category.
    pub fn product(id: i32, cents: i64) -> Product {
        let now = Utc::now();
        let price = Money::from_cents(cents);
        Product {
            id: ProductId::new(id),
            name: format!("Canapea {id}"),
            description: String::new(),
            price_cents: price,
            price: price.to_decimal(),
            image_urls: vec![],
            dimensions: Some("L: 230 cm".to_string()),
            is_active: true,
            is_available: true,
            category_id: None,
            category: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_product_json_shape() {
        let mut product = fixtures::product(7, 35_050);
        product.category_id = Some(CategoryId::new(2));
        product.category = Some(CategoryRef {
            id: CategoryId::new(2),
            name: "Canapele".to_string(),
        });

        let json = serde_json::to_value(&product).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["price_cents"], 35_050);
        assert_eq!(json["price"], 350.5);
        assert_eq!(json["category"]["name"], "Canapele");
        assert_eq!(json["image_urls"], serde_json::json!([]));
    }
}
