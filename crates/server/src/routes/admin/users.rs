//! Back-office customer accounts (read and delete only).

use axum::{Json, extract::State, http::StatusCode};
use tracing::instrument;

use simonia_core::UserId;

use super::list::{ListParams, ListQuery, ListResponse, SortFields};
use crate::db::{RepositoryError, UserFilter, UserRepository};
use crate::error::{AppError, Result};
use crate::extract::{ApiPath, ApiQuery};
use crate::middleware::RequireAdmin;
use crate::models::SafeUser;
use crate::state::AppState;

const SORT: SortFields = SortFields {
    fields: &[
        ("id", "id"),
        ("email", "email"),
        ("name", "name"),
        ("is_verified", "is_verified"),
        ("created_at", "created_at"),
    ],
    default_field: "id",
    default_descending: false,
};

/// List users without secrets.
#[instrument(skip(state, _admin))]
pub async fn index(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<ListResponse<SafeUser>> {
    let query = ListQuery::parse(&params, &SORT)?;
    let filter = UserFilter {
        ids: query.ids()?.into_iter().map(UserId::new).collect(),
        q: query.text("q"),
        is_verified: query.flag("is_verified")?,
    };

    let (rows, total) = UserRepository::new(state.pool())
        .list_page(&filter, &query.page)
        .await?;
    let rows = rows.iter().map(SafeUser::from).collect();
    Ok(ListResponse::new("users", &query, rows, total))
}

/// Show one user.
#[instrument(skip(state, _admin))]
pub async fn show(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiPath(id): ApiPath<UserId>,
) -> Result<Json<SafeUser>> {
    UserRepository::new(state.pool())
        .get_by_id(id)
        .await?
        .map(|user| Json(SafeUser::from(user)))
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

/// Delete a user. Their orders stay, detached from the account.
#[instrument(skip(state, _admin))]
pub async fn delete(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiPath(id): ApiPath<UserId>,
) -> Result<StatusCode> {
    UserRepository::new(state.pool())
        .delete(id)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => AppError::NotFound("User not found".to_string()),
            other => other.into(),
        })?;
    tracing::info!(user_id = %id, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}
