//! Back-office product management.

use axum::{Json, extract::State, http::StatusCode};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::instrument;

use simonia_core::{CategoryId, Money, ProductId};

use super::list::{ListParams, ListQuery, ListResponse, SortFields};
use crate::db::products::{NewProduct, ProductUpdate};
use crate::db::{CategoryRepository, ProductFilter, ProductRepository, RepositoryError};
use crate::error::{AppError, Result};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::RequireAdmin;
use crate::models::Product;
use crate::state::AppState;

const SORT: SortFields = SortFields {
    fields: &[
        ("id", "p.id"),
        ("name", "p.name"),
        ("price_cents", "p.price_cents"),
        ("price", "p.price_cents"),
        ("is_active", "p.is_active"),
        ("is_available", "p.is_available"),
        ("category_id", "p.category_id"),
        ("created_at", "p.created_at"),
        ("updated_at", "p.updated_at"),
    ],
    default_field: "id",
    default_descending: false,
};

// =============================================================================
// Request Types
// =============================================================================

/// `image_urls` as a single URL or a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ImageUrls {
    One(String),
    Many(Vec<String>),
}

impl From<ImageUrls> for Vec<String> {
    fn from(urls: ImageUrls) -> Self {
        let urls = match urls {
            ImageUrls::One(url) => vec![url],
            ImageUrls::Many(urls) => urls,
        };
        urls.into_iter()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect()
    }
}

/// Product fields as sent by the back office.
///
/// Every field is optional so the same shape serves create and partial
/// update; `category_id: null` clears the category.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProductPayload {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<Value>,
    pub price: Option<Decimal>,
    pub image_urls: Option<ImageUrls>,
    #[serde(deserialize_with = "nullable")]
    pub dimensions: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub is_available: Option<bool>,
    #[serde(deserialize_with = "nullable")]
    pub category_id: Option<Option<CategoryId>>,
}

/// Distinguish an explicit `null` (`Some(None)`) from an absent field (`None`).
fn nullable<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl ProductPayload {
    /// Price in cents from `price_cents`, or else from the decimal `price`.
    fn price(&self) -> Result<Option<Money>> {
        let cents = match (&self.price_cents, self.price) {
            (Some(value), _) => Some(cents_from_value(value)?),
            (None, Some(price)) => Some(cents_from_decimal(price)?),
            (None, None) => None,
        };
        match cents {
            Some(cents) if cents <= 0 => Err(invalid_price()),
            other => Ok(other.map(Money::from_cents)),
        }
    }

    fn into_update(self) -> Result<ProductUpdate> {
        let price = self.price()?;
        let name = match self.name {
            Some(name) => Some(required_name(&name)?),
            None => None,
        };
        Ok(ProductUpdate {
            name,
            description: self.description.map(|d| d.trim().to_string()),
            price,
            image_urls: self.image_urls.map(Vec::from),
            dimensions: self
                .dimensions
                .map(|d| d.map(|d| d.trim().to_string()).filter(|d| !d.is_empty())),
            is_active: self.is_active,
            is_available: self.is_available,
            category_id: self.category_id,
        })
    }

    fn into_new(self) -> Result<NewProduct> {
        let price = self
            .price()?
            .ok_or_else(|| AppError::BadRequest("Price is required".to_string()))?;
        let name = required_name(self.name.as_deref().unwrap_or_default())?;
        Ok(NewProduct {
            name,
            description: self.description.unwrap_or_default().trim().to_string(),
            price,
            image_urls: self.image_urls.map(Vec::from).unwrap_or_default(),
            dimensions: self
                .dimensions
                .flatten()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            is_active: self.is_active.unwrap_or(true),
            is_available: self.is_available.unwrap_or(true),
            category_id: self.category_id.flatten(),
        })
    }
}

fn invalid_price() -> AppError {
    AppError::BadRequest("Price must be a positive amount".to_string())
}

fn required_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Name is required".to_string()));
    }
    Ok(name.to_string())
}

/// `price_cents` as an integer, a float (rounded) or a numeric string.
fn cents_from_value(value: &Value) -> Result<i64> {
    let cents = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok()).and_then(round_cents)),
        Value::String(s) => s.trim().parse::<Decimal>().ok().and_then(round_cents),
        _ => None,
    };
    cents.ok_or_else(invalid_price)
}

fn round_cents(value: Decimal) -> Option<i64> {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
        .to_i64()
}

/// Decimal price to cents, rounding half to even.
fn cents_from_decimal(price: Decimal) -> Result<i64> {
    price
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(round_cents)
        .ok_or_else(invalid_price)
}

async fn ensure_category(state: &AppState, category_id: Option<CategoryId>) -> Result<()> {
    if let Some(id) = category_id
        && !CategoryRepository::new(state.pool()).exists(id).await?
    {
        return Err(AppError::BadRequest(format!("Category {id} does not exist")));
    }
    Ok(())
}

// =============================================================================
// Handlers
// =============================================================================

/// List products.
#[instrument(skip(state, _admin))]
pub async fn index(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<ListResponse<Product>> {
    let query = ListQuery::parse(&params, &SORT)?;
    let filter = ProductFilter {
        ids: query.ids()?.into_iter().map(ProductId::new).collect(),
        q: query.text("q"),
        category_id: query.id("category_id")?.map(CategoryId::new),
        is_active: query.flag("is_active")?,
    };

    let (rows, total) = ProductRepository::new(state.pool())
        .list_page(&filter, &query.page)
        .await?;
    Ok(ListResponse::new("products", &query, rows, total))
}

/// Show one product.
#[instrument(skip(state, _admin))]
pub async fn show(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<Json<Product>> {
    ProductRepository::new(state.pool())
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))
}

/// Create a product.
#[instrument(skip(state, _admin, payload))]
pub async fn create(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiJson(payload): ApiJson<ProductPayload>,
) -> Result<(StatusCode, Json<Product>)> {
    let product = payload.into_new()?;
    ensure_category(&state, product.category_id).await?;

    let created = ProductRepository::new(state.pool()).create(&product).await?;
    tracing::info!(product_id = %created.id, "Product created");
    Ok((StatusCode::CREATED, Json(created)))
}

/// Partially update a product.
#[instrument(skip(state, _admin, payload))]
pub async fn update(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(payload): ApiJson<ProductPayload>,
) -> Result<Json<Product>> {
    let update = payload.into_update()?;
    ensure_category(&state, update.category_id.flatten()).await?;

    let product = ProductRepository::new(state.pool())
        .update(id, &update)
        .await
        .map_err(product_not_found)?;
    Ok(Json(product))
}

/// Delete a product. Order lines keep their captured name and price.
#[instrument(skip(state, _admin))]
pub async fn delete(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<StatusCode> {
    ProductRepository::new(state.pool())
        .delete(id)
        .await
        .map_err(product_not_found)?;
    tracing::info!(product_id = %id, "Product deleted");
    Ok(StatusCode::NO_CONTENT)
}

fn product_not_found(err: RepositoryError) -> AppError {
    match err {
        RepositoryError::NotFound => AppError::NotFound("Product not found".to_string()),
        other => other.into(),
    }
}
