//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! # Catalog
//! GET    /api/products
//! GET    /api/products/search?query=
//! GET    /api/products/{id}
//! GET    /api/categories
//!
//! # Cart (guest cookie or user rows)
//! GET    /api/cart
//! POST   /api/cart
//! DELETE /api/cart
//! PUT    /api/cart/item/{id}
//! DELETE /api/cart/item/{id}
//! POST   /api/cart/sync            (auth)
//!
//! # Orders
//! POST   /api/orders               Idempotency-Key aware
//! GET    /api/orders               (auth)
//!
//! # Auth
//! POST   /api/register
//! GET    /api/verify?token=
//! POST   /api/verify/resend
//! POST   /api/login
//! POST   /api/logout
//! GET    /api/me                   (auth)
//! GET    /api/auth/google/login
//! GET    /api/auth/google/callback
//!
//! # Back office
//! /api/admin/*                     see [`admin`]
//! ```

pub mod admin;
pub mod auth;
pub mod cart;
pub mod categories;
pub mod google_auth;
pub mod orders;
pub mod products;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::middleware::auth_rate_limiter;
use crate::state::AppState;

/// Create the catalog routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/search", get(products::search))
        .route("/{id}", get(products::show))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).post(cart::add).delete(cart::clear))
        .route("/item/{id}", put(cart::update).delete(cart::remove))
        .route("/sync", post(cart::sync))
}

/// Create the customer auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register).layer(auth_rate_limiter()))
        .route("/login", post(auth::login).layer(auth_rate_limiter()))
        .route(
            "/verify/resend",
            post(auth::resend_verification).layer(auth_rate_limiter()),
        )
        .route("/verify", get(auth::verify))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .route("/auth/google/login", get(google_auth::login))
        .route("/auth/google/callback", get(google_auth::callback))
}

/// Create all `/api` routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/products", product_routes())
        .route("/categories", get(categories::index))
        .nest("/cart", cart_routes())
        .route("/orders", get(orders::index).post(orders::create))
        .merge(auth_routes())
        .nest("/admin", admin::routes())
}
