//! Public catalog routes.

use axum::{Json, extract::State};
use serde::Deserialize;
use tracing::instrument;

use simonia_core::ProductId;

use crate::db::ProductRepository;
use crate::error::{AppError, Result};
use crate::extract::{ApiPath, ApiQuery};
use crate::models::Product;
use crate::state::AppState;

/// Query parameters for product search.
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
}

/// List active products.
#[instrument(skip(state))]
pub async fn index(State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    let products = ProductRepository::new(state.pool()).list_active().await?;
    Ok(Json(products))
}

/// Search active products by name or description.
///
/// Matching ignores case and diacritics; an empty query lists everything.
#[instrument(skip(state))]
pub async fn search(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<SearchQuery>,
) -> Result<Json<Vec<Product>>> {
    let repo = ProductRepository::new(state.pool());
    let query = params.query.trim();
    let products = if query.is_empty() {
        repo.list_active().await?
    } else {
        repo.search(query).await?
    };
    Ok(Json(products))
}

/// Product by id, including inactive ones still referenced by carts and orders.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<Json<Product>> {
    ProductRepository::new(state.pool())
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))
}
