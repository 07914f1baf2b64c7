//! Order routes.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use tracing::instrument;

use crate::error::Result;
use crate::extract::ApiJson;
use crate::middleware::{OptionalUser, RequireUser};
use crate::models::Order;
use crate::services::orders::{
    OrderRequest, OrderService, PlacedOrder, ValidOrder, parse_idempotency_key,
};
use crate::state::AppState;

/// Header making order creation safe to retry.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Place an order.
///
/// Returns `201` with the new order, or `200` with the original order when
/// an `Idempotency-Key` repeats an earlier identical request.
#[instrument(skip(state, headers, request), fields(user_id))]
pub async fn create(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    headers: HeaderMap,
    ApiJson(request): ApiJson<OrderRequest>,
) -> Result<(StatusCode, Json<Order>)> {
    if let Some(user) = &user {
        tracing::Span::current().record("user_id", tracing::field::display(user.id));
    }

    let idempotency_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .map(|value| parse_idempotency_key(value.as_bytes()))
        .transpose()?;
    let order = ValidOrder::parse(request, user.as_ref())?;

    let placed = OrderService::new(state.pool(), state.email())
        .place(&order, idempotency_key.as_deref())
        .await?;

    match placed {
        PlacedOrder::Created(order) => {
            state.wake_outbox();
            Ok((StatusCode::CREATED, Json(order)))
        }
        PlacedOrder::Replayed(order) => {
            tracing::info!(order_id = %order.id, "Replayed order for idempotency key");
            Ok((StatusCode::OK, Json(order)))
        }
    }
}

/// The signed-in customer's orders, newest first.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Vec<Order>>> {
    let orders = OrderService::new(state.pool(), state.email())
        .list_for_user(user.id)
        .await?;
    Ok(Json(orders))
}
