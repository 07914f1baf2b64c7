//! Cart routes.
//!
//! The same endpoints serve guests and signed-in customers. Guests keep their
//! cart in the `guestCart` cookie, which is rewritten on every change;
//! customers' carts live in the database. For guests a cart line's `id` is
//! the product id, for customers it is the `cart_items` row id.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::instrument;

use simonia_core::{CartItemId, ProductId};

use crate::db::cart::LineInput;
use crate::error::Result;
use crate::extract::{ApiJson, ApiPath};
use crate::middleware::{OptionalUser, RequireUser};
use crate::models::CartView;
use crate::services::cart::{CartService, GuestCart};
use crate::state::AppState;

// =============================================================================
// Request Types
// =============================================================================

/// Add-to-cart request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

const fn default_quantity() -> i32 {
    1
}

/// Quantity update request.
#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i32,
}

/// One line of a cart sync request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLine {
    pub product_id: ProductId,
    pub quantity: i32,
}

/// Replace the signed-in customer's cart.
#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub items: Vec<SyncLine>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Show the current cart.
#[instrument(skip(state, headers))]
pub async fn show(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    headers: HeaderMap,
) -> Result<Response> {
    let service = CartService::new(state.pool());

    if let Some(user) = user {
        return Ok(Json(service.user_cart(user.id).await?).into_response());
    }

    let mut guest = GuestCart::from_headers(&headers);
    let before = guest.lines().len();
    let view = service.guest_cart(&mut guest).await?;

    // Forget products that no longer exist
    if guest.lines().len() == before {
        Ok(Json(view).into_response())
    } else {
        Ok(guest_response(&state, &mut guest, StatusCode::OK, Some(view)))
    }
}

/// Add a product, incrementing the quantity when it is already in the cart.
#[instrument(skip(state, headers))]
pub async fn add(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    headers: HeaderMap,
    ApiJson(request): ApiJson<AddToCartRequest>,
) -> Result<Response> {
    let service = CartService::new(state.pool());

    if let Some(user) = user {
        let view = service
            .add_for_user(user.id, request.product_id, request.quantity)
            .await?;
        return Ok(Json(view).into_response());
    }

    let mut guest = GuestCart::from_headers(&headers);
    let view = service
        .add_for_guest(&mut guest, request.product_id, request.quantity)
        .await?;
    Ok(guest_response(&state, &mut guest, StatusCode::OK, Some(view)))
}

/// Set the quantity of a cart line.
#[instrument(skip(state, headers))]
pub async fn update(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    headers: HeaderMap,
    ApiPath(id): ApiPath<i32>,
    ApiJson(request): ApiJson<UpdateQuantityRequest>,
) -> Result<Response> {
    let service = CartService::new(state.pool());

    if let Some(user) = user {
        let view = service
            .update_for_user(user.id, CartItemId::new(id), request.quantity)
            .await?;
        return Ok(Json(view).into_response());
    }

    let mut guest = GuestCart::from_headers(&headers);
    let view = service
        .update_for_guest(&mut guest, ProductId::new(id), request.quantity)
        .await?;
    Ok(guest_response(&state, &mut guest, StatusCode::OK, Some(view)))
}

/// Remove a cart line. Removing an absent line succeeds.
#[instrument(skip(state, headers))]
pub async fn remove(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    headers: HeaderMap,
    ApiPath(id): ApiPath<i32>,
) -> Result<Response> {
    if let Some(user) = user {
        CartService::new(state.pool())
            .remove_for_user(user.id, CartItemId::new(id))
            .await?;
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let mut guest = GuestCart::from_headers(&headers);
    guest.remove(ProductId::new(id));
    Ok(guest_response(&state, &mut guest, StatusCode::NO_CONTENT, None))
}

/// Empty the cart.
#[instrument(skip(state))]
pub async fn clear(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
) -> Result<Response> {
    if let Some(user) = user {
        CartService::new(state.pool()).clear_for_user(user.id).await?;
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let config = state.config();
    let cookie = GuestCart::removal_cookie(config.secure_cookies(), config.cookie_same_site);
    Ok((StatusCode::NO_CONTENT, [(SET_COOKIE, cookie.to_string())]).into_response())
}

/// Replace the signed-in customer's cart with the given lines.
///
/// Duplicate products are summed; unknown products are skipped.
#[instrument(skip(state, request), fields(lines = request.items.len()))]
pub async fn sync(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    ApiJson(request): ApiJson<SyncRequest>,
) -> Result<Json<CartView>> {
    let lines = request
        .items
        .into_iter()
        .map(|line| LineInput {
            product_id: line.product_id,
            quantity: line.quantity,
        })
        .collect();
    let view = CartService::new(state.pool()).sync(user.id, lines).await?;
    Ok(Json(view))
}

/// Response carrying the rewritten guest cart cookie.
fn guest_response(
    state: &AppState,
    guest: &mut GuestCart,
    status: StatusCode,
    view: Option<CartView>,
) -> Response {
    let config = state.config();
    let cookie = guest.to_cookie(config.secure_cookies(), config.cookie_same_site);
    let headers = [(SET_COOKIE, cookie.to_string())];
    match view {
        Some(view) => (status, headers, Json(view)).into_response(),
        None => (status, headers).into_response(),
    }
}
