//! Back-office JSON API for the React-Admin SPA.
//!
//! # Route Structure
//!
//! ```text
//! POST   /api/admin/login
//! POST   /api/admin/logout
//! GET    /api/admin/me
//!
//! GET    /api/admin/products            list (range/sort/filter, Content-Range)
//! POST   /api/admin/products
//! GET    /api/admin/products/{id}
//! PUT    /api/admin/products/{id}
//! DELETE /api/admin/products/{id}
//!
//! GET    /api/admin/orders
//! GET    /api/admin/orders/{id}
//! PUT    /api/admin/orders/{id}
//! DELETE /api/admin/orders/{id}
//! PUT    /api/admin/orders/{id}/status
//! POST   /api/admin/orders/{id}/resend-email
//!
//! GET    /api/admin/users
//! GET    /api/admin/users/{id}
//! DELETE /api/admin/users/{id}
//!
//! GET    /api/admin/categories
//! POST   /api/admin/categories
//! GET    /api/admin/categories/{id}
//! PUT    /api/admin/categories/{id}
//! DELETE /api/admin/categories/{id}
//!
//! POST   /api/admin/upload              multipart `file`
//! ```
//!
//! Everything except `login` requires the admin session.

pub mod auth;
pub mod categories;
pub mod list;
pub mod orders;
pub mod products;
pub mod upload;
pub mod users;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};

use crate::middleware::auth_rate_limiter;
use crate::services::uploads::MAX_UPLOAD_BYTES;
use crate::state::AppState;

/// Multipart framing allowance on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Create the admin router (mounted at `/api/admin`).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::login).layer(auth_rate_limiter()))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .route("/products", get(products::index).post(products::create))
        .route(
            "/products/{id}",
            get(products::show)
                .put(products::update)
                .delete(products::delete),
        )
        .route("/orders", get(orders::index))
        .route(
            "/orders/{id}",
            get(orders::show).put(orders::update).delete(orders::delete),
        )
        .route("/orders/{id}/status", put(orders::update_status))
        .route("/orders/{id}/resend-email", post(orders::resend_email))
        .route("/users", get(users::index))
        .route("/users/{id}", get(users::show).delete(users::delete))
        .route(
            "/categories",
            get(categories::index).post(categories::create),
        )
        .route(
            "/categories/{id}",
            get(categories::show)
                .put(categories::update)
                .delete(categories::delete),
        )
        .route(
            "/upload",
            post(upload::upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + MULTIPART_OVERHEAD)),
        )
}
