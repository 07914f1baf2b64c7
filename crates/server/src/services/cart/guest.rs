//! Guest cart stored in the `guestCart` cookie.
//!
//! The cookie holds URL-encoded JSON. Current format:
//!
//! ```json
//! {"id":"6f0c…","items":[{"productId":3,"quantity":2}]}
//! ```
//!
//! The storefront used to write a bare array of lines; that legacy format is
//! still read. Anything unreadable is treated as an empty cart.

use axum::http::{HeaderMap, header};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tower_sessions::cookie::{Cookie, SameSite, time::Duration as CookieDuration};
use uuid::Uuid;

use simonia_core::ProductId;

use super::CartError;
use crate::db::cart::MAX_LINE_QUANTITY;

/// Cookie name, shared with the storefront SPA.
pub const GUEST_CART_COOKIE: &str = "guestCart";

/// Most distinct products a guest cart may hold.
pub const MAX_GUEST_LINES: usize = 50;

/// Cookie lifetime in days.
const COOKIE_MAX_AGE_DAYS: i64 = 30;

/// One line of a guest cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestLine {
    pub product_id: ProductId,
    pub quantity: i32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireFormat {
    Current { id: Uuid, items: Vec<GuestLine> },
    Legacy(Vec<GuestLine>),
}

#[derive(Serialize)]
struct WireOut<'a> {
    id: Uuid,
    items: &'a [GuestLine],
}

/// A guest cart decoded from its cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuestCart {
    /// `None` for legacy carts and carts never written by this server.
    id: Option<Uuid>,
    lines: Vec<GuestLine>,
}

impl GuestCart {
    /// Read the cart from the request's `Cookie` headers.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .find(|cookie| cookie.name() == GUEST_CART_COOKIE)
            .map(|cookie| Self::decode(cookie.value()))
            .unwrap_or_default()
    }

    /// Whether the request carries a `guestCart` cookie at all.
    #[must_use]
    pub fn present_in(headers: &HeaderMap) -> bool {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .any(|cookie| cookie.name() == GUEST_CART_COOKIE)
    }

    /// Decode a cookie value. Malformed input yields an empty cart.
    #[must_use]
    pub fn decode(raw: &str) -> Self {
        let decoded = match urlencoding::decode(raw) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::debug!(error = %e, "Guest cart cookie is not valid UTF-8");
                return Self::default();
            }
        };

        match serde_json::from_str::<WireFormat>(&decoded) {
            Ok(WireFormat::Current { id, items }) => Self::normalized(Some(id), items),
            Ok(WireFormat::Legacy(items)) => Self::normalized(None, items),
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring malformed guest cart cookie");
                Self::default()
            }
        }
    }

    /// Merge duplicate products, drop invalid quantities, cap the line count.
    fn normalized(id: Option<Uuid>, items: Vec<GuestLine>) -> Self {
        let mut lines: Vec<GuestLine> = Vec::with_capacity(items.len().min(MAX_GUEST_LINES));
        for item in items.into_iter().filter(|item| item.quantity >= 1) {
            if let Some(line) = lines.iter_mut().find(|l| l.product_id == item.product_id) {
                line.quantity = line
                    .quantity
                    .saturating_add(item.quantity)
                    .min(MAX_LINE_QUANTITY);
            } else if lines.len() < MAX_GUEST_LINES {
                lines.push(GuestLine {
                    product_id: item.product_id,
                    quantity: item.quantity.min(MAX_LINE_QUANTITY),
                });
            }
        }
        Self { id, lines }
    }

    /// Lines in insertion order.
    #[must_use]
    pub fn lines(&self) -> &[GuestLine] {
        &self.lines
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Add `quantity` of a product, incrementing an existing line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::TooManyLines` when a new line would exceed
    /// [`MAX_GUEST_LINES`].
    pub fn add(&mut self, product_id: ProductId, quantity: i32) -> Result<(), CartError> {
        if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product_id) {
            line.quantity = line.quantity.saturating_add(quantity).min(MAX_LINE_QUANTITY);
            return Ok(());
        }
        if self.lines.len() >= MAX_GUEST_LINES {
            return Err(CartError::TooManyLines);
        }
        self.lines.push(GuestLine {
            product_id,
            quantity: quantity.min(MAX_LINE_QUANTITY),
        });
        Ok(())
    }

    /// Set the quantity of an existing line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ItemNotFound` if the product is not in the cart.
    pub fn set_quantity(&mut self, product_id: ProductId, quantity: i32) -> Result<(), CartError> {
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.product_id == product_id)
            .ok_or(CartError::ItemNotFound)?;
        line.quantity = quantity.min(MAX_LINE_QUANTITY);
        Ok(())
    }

    /// Remove a product's line. Returns whether it was present.
    pub fn remove(&mut self, product_id: ProductId) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);
        self.lines.len() != before
    }

    /// Drop lines whose product no longer exists.
    pub fn retain_products(&mut self, known: impl Fn(ProductId) -> bool) {
        self.lines.retain(|l| known(l.product_id));
    }

    /// Key that identifies this cart's contents for merge bookkeeping.
    ///
    /// Carts written by this server use their id. Legacy carts have none, so
    /// the key is a hash of their canonical content: equal payloads get equal
    /// keys, which stops the same legacy cookie from being merged twice.
    #[must_use]
    pub fn merge_key(&self) -> String {
        if let Some(id) = self.id {
            return id.to_string();
        }

        let mut canonical = self.lines.clone();
        canonical.sort_by_key(|l| l.product_id);
        let mut hasher = Sha256::new();
        for line in &canonical {
            hasher.update(line.product_id.get().to_be_bytes());
            hasher.update(line.quantity.to_be_bytes());
        }
        format!("legacy:{}", hex::encode(hasher.finalize()))
    }

    /// Encode for the cookie, assigning an id if the cart has none.
    #[must_use]
    pub fn encode(&mut self) -> String {
        let id = *self.id.get_or_insert_with(Uuid::new_v4);
        let json = serde_json::to_string(&WireOut {
            id,
            items: &self.lines,
        })
        .unwrap_or_else(|_| "[]".to_string());
        urlencoding::encode(&json).into_owned()
    }

    /// `Set-Cookie` value storing this cart.
    #[must_use]
    pub fn to_cookie(&mut self, secure: bool, same_site: SameSite) -> Cookie<'static> {
        Cookie::build((GUEST_CART_COOKIE, self.encode()))
            .path("/")
            .max_age(CookieDuration::days(COOKIE_MAX_AGE_DAYS))
            .same_site(same_site)
            .secure(secure)
            .http_only(false)
            .build()
    }

    /// `Set-Cookie` value deleting the cart cookie.
    #[must_use]
    pub fn removal_cookie(secure: bool, same_site: SameSite) -> Cookie<'static> {
        Cookie::build((GUEST_CART_COOKIE, ""))
            .path("/")
            .max_age(CookieDuration::ZERO)
            .same_site(same_site)
            .secure(secure)
            .http_only(false)
            .build()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn pid(id: i32) -> ProductId {
        ProductId::new(id)
    }

    fn encoded(json: &str) -> String {
        urlencoding::encode(json).into_owned()
    }

    #[test]
    fn test_decode_current_format() {
        let raw = encoded(
            r#"{"id":"2f1b6c4e-3a65-4a3c-9d1e-6b7f2f4d9a10","items":[{"productId":3,"quantity":2}]}"#,
        );
        let cart = GuestCart::decode(&raw);
        assert_eq!(cart.lines(), &[GuestLine { product_id: pid(3), quantity: 2 }]);
        assert_eq!(cart.merge_key(), "2f1b6c4e-3a65-4a3c-9d1e-6b7f2f4d9a10");
    }

    #[test]
    fn test_decode_legacy_array() {
        let raw = encoded(r#"[{"productId":1,"quantity":1},{"productId":2,"quantity":4}]"#);
        let cart = GuestCart::decode(&raw);
        assert_eq!(cart.lines().len(), 2);
        assert!(cart.merge_key().starts_with("legacy:"));
    }

    #[test]
    fn test_decode_malformed_is_empty() {
        assert!(GuestCart::decode("not json").is_empty());
        assert!(GuestCart::decode(&encoded(r#"{"items":5}"#)).is_empty());
        assert!(GuestCart::decode("%FF%FE").is_empty());
        assert!(GuestCart::decode("").is_empty());
    }

    #[test]
    fn test_decode_normalizes_lines() {
        let raw = encoded(
            r#"[{"productId":1,"quantity":2},{"productId":1,"quantity":3},{"productId":2,"quantity":0},{"productId":3,"quantity":5000}]"#,
        );
        let cart = GuestCart::decode(&raw);
        assert_eq!(
            cart.lines(),
            &[
                GuestLine { product_id: pid(1), quantity: 5 },
                GuestLine { product_id: pid(3), quantity: MAX_LINE_QUANTITY },
            ]
        );
    }

    #[test]
    fn test_encode_then_decode_keeps_lines_and_id() {
        let mut cart = GuestCart::default();
        cart.add(pid(7), 2).unwrap();
        cart.add(pid(9), 1).unwrap();
        let raw = cart.encode();
        let decoded = GuestCart::decode(&raw);
        assert_eq!(decoded.lines(), cart.lines());
        assert_eq!(decoded.merge_key(), cart.merge_key());
        assert!(!decoded.merge_key().starts_with("legacy:"));
    }

    #[test]
    fn test_legacy_merge_key_is_order_independent() {
        let a = GuestCart::decode(&encoded(
            r#"[{"productId":1,"quantity":1},{"productId":2,"quantity":4}]"#,
        ));
        let b = GuestCart::decode(&encoded(
            r#"[{"productId":2,"quantity":4},{"productId":1,"quantity":1}]"#,
        ));
        let c = GuestCart::decode(&encoded(
            r#"[{"productId":2,"quantity":5},{"productId":1,"quantity":1}]"#,
        ));
        assert_eq!(a.merge_key(), b.merge_key());
        assert_ne!(a.merge_key(), c.merge_key());
    }

    #[test]
    fn test_add_increments_and_caps() {
        let mut cart = GuestCart::default();
        cart.add(pid(1), 2).unwrap();
        cart.add(pid(1), 3).unwrap();
        assert_eq!(cart.lines()[0].quantity, 5);
        cart.add(pid(1), 995).unwrap();
        assert_eq!(cart.lines()[0].quantity, MAX_LINE_QUANTITY);
    }

    #[test]
    fn test_add_respects_line_limit() {
        let mut cart = GuestCart::default();
        for id in 1..=50 {
            cart.add(pid(id), 1).unwrap();
        }
        assert!(matches!(cart.add(pid(51), 1), Err(CartError::TooManyLines)));
        cart.add(pid(50), 1).unwrap();
        assert_eq!(cart.lines().len(), MAX_GUEST_LINES);
    }

    #[test]
    fn test_set_quantity_and_remove() {
        let mut cart = GuestCart::default();
        cart.add(pid(4), 1).unwrap();
        cart.set_quantity(pid(4), 6).unwrap();
        assert_eq!(cart.lines()[0].quantity, 6);
        assert!(matches!(
            cart.set_quantity(pid(5), 1),
            Err(CartError::ItemNotFound)
        ));
        assert!(cart.remove(pid(4)));
        assert!(!cart.remove(pid(4)));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_from_headers_finds_cookie() {
        let mut cart = GuestCart::default();
        cart.add(pid(2), 3).unwrap();
        let value = format!("theme=dark; {GUEST_CART_COOKIE}={}; other=1", cart.encode());

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(&value).unwrap());

        assert!(GuestCart::present_in(&headers));
        assert_eq!(GuestCart::from_headers(&headers).lines(), cart.lines());
        assert!(!GuestCart::present_in(&HeaderMap::new()));
    }

    #[test]
    fn test_cookie_attributes() {
        let mut cart = GuestCart::default();
        let cookie = cart.to_cookie(true, SameSite::Lax).to_string();
        assert!(cookie.starts_with("guestCart="));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=2592000"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Secure"));
        assert!(!cookie.contains("HttpOnly"));

        let removal = GuestCart::removal_cookie(false, SameSite::Lax).to_string();
        assert!(removal.contains("Max-Age=0"));
        assert!(!removal.contains("Secure"));
    }
}
