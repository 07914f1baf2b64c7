//! HTTP middleware stack.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. `TraceLayer` (request span)
//! 3. Request ID (`x-request-id` in and out)
//! 4. CORS
//! 5. Security headers
//! 6. Session layer (tower-sessions)
//! 7. Rate limiting on credential routes only (governor)

pub mod auth;
pub mod cors;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;
pub mod session;

pub use auth::{
    OptionalUser, RequireAdmin, RequireUser, clear_current_admin, clear_current_user,
    set_current_admin, set_current_user,
};
pub use cors::cors_layer;
pub use rate_limit::auth_rate_limiter;
pub use request_id::{RequestId, request_id_middleware};
pub use security_headers::security_headers_middleware;
pub use session::create_session_layer;
