//! Back-office category management.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use tracing::instrument;

use simonia_core::CategoryId;

use super::list::{ListParams, ListQuery, ListResponse, SortFields};
use crate::db::{CategoryFilter, CategoryRepository, RepositoryError};
use crate::error::{AppError, Result};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::RequireAdmin;
use crate::models::Category;
use crate::state::AppState;

const SORT: SortFields = SortFields {
    fields: &[
        ("id", "id"),
        ("name", "name"),
        ("created_at", "created_at"),
        ("updated_at", "updated_at"),
    ],
    default_field: "id",
    default_descending: false,
};

/// Longest category name.
const MAX_NAME_LEN: usize = 100;

/// Category create/rename request.
#[derive(Debug, Deserialize)]
pub struct CategoryPayload {
    #[serde(default)]
    pub name: String,
}

impl CategoryPayload {
    fn name(&self) -> Result<&str> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("Name is required".to_string()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(AppError::BadRequest(format!(
                "Name must be at most {MAX_NAME_LEN} characters"
            )));
        }
        Ok(name)
    }
}

fn category_error(err: RepositoryError) -> AppError {
    match err {
        RepositoryError::NotFound => AppError::NotFound("Category not found".to_string()),
        other => other.into(),
    }
}

/// List categories.
#[instrument(skip(state, _admin))]
pub async fn index(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<ListResponse<Category>> {
    let query = ListQuery::parse(&params, &SORT)?;
    let filter = CategoryFilter {
        ids: query.ids()?.into_iter().map(CategoryId::new).collect(),
        q: query.text("q"),
    };

    let (rows, total) = CategoryRepository::new(state.pool())
        .list_page(&filter, &query.page)
        .await?;
    Ok(ListResponse::new("categories", &query, rows, total))
}

/// Show one category.
#[instrument(skip(state, _admin))]
pub async fn show(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiPath(id): ApiPath<CategoryId>,
) -> Result<Json<Category>> {
    CategoryRepository::new(state.pool())
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Category not found".to_string()))
}

/// Create a category. Names are unique.
#[instrument(skip(state, _admin))]
pub async fn create(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiJson(payload): ApiJson<CategoryPayload>,
) -> Result<(StatusCode, Json<Category>)> {
    let category = CategoryRepository::new(state.pool())
        .create(payload.name()?)
        .await?;
    tracing::info!(category_id = %category.id, "Category created");
    Ok((StatusCode::CREATED, Json(category)))
}

/// Rename a category.
#[instrument(skip(state, _admin))]
pub async fn update(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiPath(id): ApiPath<CategoryId>,
    ApiJson(payload): ApiJson<CategoryPayload>,
) -> Result<Json<Category>> {
    let category = CategoryRepository::new(state.pool())
        .rename(id, payload.name()?)
        .await
        .map_err(category_error)?;
    Ok(Json(category))
}

/// Delete a category; its products become uncategorised.
#[instrument(skip(state, _admin))]
pub async fn delete(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiPath(id): ApiPath<CategoryId>,
) -> Result<StatusCode> {
    CategoryRepository::new(state.pool())
        .delete(id)
        .await
        .map_err(category_error)?;
    tracing::info!(category_id = %id, "Category deleted");
    Ok(StatusCode::NO_CONTENT)
}
