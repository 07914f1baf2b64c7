//! Session middleware configuration.
//!
//! Sessions are stored server-side (`PostgresStore` in production,
//! `MemoryStore` in router tests); the cookie only carries a random id.

use tower_sessions::cookie::SameSite;
use tower_sessions::cookie::time::Duration;
use tower_sessions::{Expiry, SessionManagerLayer, SessionStore};

use crate::config::ServerConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "simonia_session";

/// Session expiry time in seconds (7 days).
const SESSION_EXPIRY_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Create the session layer over `store`.
///
/// The cookie is `HttpOnly`, scoped to `/`, and `Secure` whenever the API is
/// served over https or `SameSite=None` is configured.
#[must_use]
pub fn create_session_layer<S: SessionStore + Clone>(
    store: S,
    config: &ServerConfig,
) -> SessionManagerLayer<S> {
    session_layer(store, config.secure_cookies(), config.cookie_same_site)
}

fn session_layer<S: SessionStore + Clone>(
    store: S,
    secure: bool,
    same_site: SameSite,
) -> SessionManagerLayer<S> {
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(Duration::seconds(SESSION_EXPIRY_SECONDS)))
        .with_secure(secure)
        .with_same_site(same_site)
        .with_http_only(true)
        .with_path("/")
}
