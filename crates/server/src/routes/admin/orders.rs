//! Back-office order management.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use simonia_core::{OrderId, OrderStatus, UserId};

use super::list::{ListParams, ListQuery, ListResponse, SortFields};
use crate::db::orders::OrderUpdate;
use crate::db::outbox::OutboxRepository;
use crate::db::{OrderFilter, OrderRepository, RepositoryError};
use crate::error::{AppError, Result};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::RequireAdmin;
use crate::models::Order;
use crate::state::AppState;

const SORT: SortFields = SortFields {
    fields: &[
        ("id", "id"),
        ("created_at", "created_at"),
        ("updated_at", "updated_at"),
        ("status", "status"),
        ("total_cents", "total_cents"),
        ("total", "total_cents"),
        ("name", "name"),
        ("city", "city"),
        ("email_sent", "email_sent"),
    ],
    default_field: "created_at",
    default_descending: true,
};

/// Editable order fields. Anything else React-Admin sends back is ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OrderPayload {
    pub status: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub notes: Option<String>,
}

impl OrderPayload {
    fn into_update(self) -> Result<OrderUpdate> {
        let trim = |value: Option<String>| value.map(|v| v.trim().to_string());
        Ok(OrderUpdate {
            status: self.status.as_deref().map(parse_status).transpose()?,
            name: trim(self.name),
            phone: trim(self.phone),
            email: trim(self.email),
            address: trim(self.address),
            city: trim(self.city),
            notes: trim(self.notes),
        })
    }
}

/// Status change request.
#[derive(Debug, Deserialize)]
pub struct StatusPayload {
    #[serde(default)]
    pub status: String,
}

fn parse_status(raw: &str) -> Result<OrderStatus> {
    raw.trim()
        .to_ascii_lowercase()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid status: {raw}")))
}

fn order_not_found(err: RepositoryError) -> AppError {
    match err {
        RepositoryError::NotFound => AppError::NotFound("Order not found".to_string()),
        other => other.into(),
    }
}

/// List orders with their items.
#[instrument(skip(state, _admin))]
pub async fn index(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<ListResponse<Order>> {
    let query = ListQuery::parse(&params, &SORT)?;
    let status = query.text("status").as_deref().map(parse_status).transpose()?;
    let filter = OrderFilter {
        ids: query.ids()?.into_iter().map(OrderId::new).collect(),
        q: query.text("q"),
        status,
        user_id: query.id("user_id")?.map(UserId::new),
    };

    let (rows, total) = OrderRepository::new(state.pool())
        .list_page(&filter, &query.page)
        .await?;
    Ok(ListResponse::new("orders", &query, rows, total))
}

/// Show one order.
#[instrument(skip(state, _admin))]
pub async fn show(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<Order>> {
    OrderRepository::new(state.pool())
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))
}

/// Update contact details and/or status.
#[instrument(skip(state, _admin, payload))]
pub async fn update(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiPath(id): ApiPath<OrderId>,
    ApiJson(payload): ApiJson<OrderPayload>,
) -> Result<Json<Order>> {
    let update = payload.into_update()?;
    let order = OrderRepository::new(state.pool())
        .update(id, &update)
        .await
        .map_err(order_not_found)?;
    Ok(Json(order))
}

/// Change only the status.
#[instrument(skip(state, _admin))]
pub async fn update_status(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiPath(id): ApiPath<OrderId>,
    ApiJson(payload): ApiJson<StatusPayload>,
) -> Result<Json<Order>> {
    let update = OrderUpdate {
        status: Some(parse_status(&payload.status)?),
        ..OrderUpdate::default()
    };
    let order = OrderRepository::new(state.pool())
        .update(id, &update)
        .await
        .map_err(order_not_found)?;
    tracing::info!(order_id = %id, status = %order.status, "Order status changed");
    Ok(Json(order))
}

/// Delete an order and its items.
#[instrument(skip(state, _admin))]
pub async fn delete(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<StatusCode> {
    OrderRepository::new(state.pool())
        .delete(id)
        .await
        .map_err(order_not_found)?;
    tracing::info!(order_id = %id, "Order deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Queue the order notification email again.
///
/// Reuses the latest outbox message for the order; if there is none (it was
/// placed before the outbox existed) a fresh one is rendered.
#[instrument(skip(state, _admin))]
pub async fn resend_email(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let order = OrderRepository::new(state.pool())
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

    let requeued = OutboxRepository::new(state.pool())
        .requeue_for_order(order.id)
        .await?;
    if !requeued {
        let message = state
            .email()
            .order_notification(&order)
            .map_err(|e| AppError::Internal(format!("render order notification: {e}")))?;
        OutboxRepository::new(state.pool()).enqueue(&message).await?;
    }
    state.wake_outbox();

    tracing::info!(order_id = %id, requeued, "Order notification queued again");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"message": "Email queued"})),
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("processing").unwrap(), OrderStatus::Processing);
        assert_eq!(parse_status(" Cancelled ").unwrap(), OrderStatus::Cancelled);
        assert!(parse_status("shipped").is_err());
    }

    #[test]
    fn test_payload_ignores_other_fields() {
        let payload: OrderPayload = serde_json::from_str(
            r#"{"id": 4, "status": "completed", "city": " Chișinău ", "total_cents": 1, "items": []}"#,
        )
        .unwrap();
        let update = payload.into_update().unwrap();
        assert_eq!(update.status, Some(OrderStatus::Completed));
        assert_eq!(update.city.as_deref(), Some("Chișinău"));
        assert!(update.name.is_none());
    }

    #[test]
    fn test_payload_rejects_bad_status() {
        let payload: OrderPayload = serde_json::from_str(r#"{"status": "lost"}"#).unwrap();
        assert!(payload.into_update().is_err());
    }
}
