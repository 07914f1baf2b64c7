//! Customer authentication routes: registration, email verification,
//! password login and logout.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use serde_json::json;
use tower_sessions::Session;
use tower_sessions::cookie::Cookie;
use tracing::instrument;

use crate::db::UserRepository;
use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::extract::{ApiJson, ApiQuery};
use crate::middleware::{RequireUser, clear_current_user, set_current_user};
use crate::models::{CurrentUser, SafeUser, User};
use crate::services::auth::{AuthService, Registration};
use crate::services::cart::{CartService, GuestCart};
use crate::state::AppState;

// =============================================================================
// Request Types
// =============================================================================

/// Registration request.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
}

/// Login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Resend verification request.
#[derive(Debug, Deserialize)]
pub struct ResendRequest {
    #[serde(default)]
    pub email: String,
}

/// Query parameters of the verification link.
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub token: Option<String>,
    pub redirect: Option<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Register a password account and queue the verification email.
#[instrument(skip(state, request), fields(email = %request.email))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let registration = Registration::parse(
        &request.email,
        &request.password,
        &request.name,
        &request.phone,
    )?;

    AuthService::new(state.pool(), state.email())
        .register(&registration)
        .await?;
    state.wake_outbox();

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Registration successful. Please check your email to verify your account."
        })),
    ))
}

/// Consume a verification link.
///
/// With `redirect=1` the browser is sent back to the storefront login page
/// instead of receiving JSON.
#[instrument(skip(state, query))]
pub async fn verify(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<VerifyQuery>,
) -> Result<Response> {
    let redirect = query.redirect.as_deref() == Some("1");
    let token = query.token.as_deref().map(str::trim).unwrap_or_default();
    if token.is_empty() {
        return Err(AppError::BadRequest("Token is required".to_string()));
    }

    let result = AuthService::new(state.pool(), state.email())
        .verify_email(token)
        .await;

    let frontend = &state.config().frontend_url;
    match (result, redirect) {
        (Ok(_), true) => Ok(Redirect::to(&format!("{frontend}/login?verified=1")).into_response()),
        (Ok(user), false) => {
            tracing::info!(user_id = %user.id, "Email verified");
            Ok(Json(json!({"message": "Email verified. You can now log in."})).into_response())
        }
        (Err(e), true) => {
            tracing::debug!(error = %e, "Verification link rejected");
            Ok(Redirect::to(&format!("{frontend}/login?error=invalid_token")).into_response())
        }
        (Err(e), false) => Err(e.into()),
    }
}

/// Re-send the verification email.
///
/// Answers the same whether or not an unverified account exists.
#[instrument(skip(state, request))]
pub async fn resend_verification(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ResendRequest>,
) -> Result<Json<serde_json::Value>> {
    let sent = AuthService::new(state.pool(), state.email())
        .resend_verification(&request.email)
        .await?;
    if sent {
        state.wake_outbox();
    }

    Ok(Json(json!({
        "message": "If an unverified account exists for this email, a new verification link has been sent."
    })))
}

/// Log in with email and password.
#[instrument(skip(state, session, headers, request))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Response> {
    let user = AuthService::new(state.pool(), state.email())
        .login(&request.email, &request.password)
        .await?;

    let removal = establish_session(&state, &session, &headers, &user).await?;
    let body = Json(json!({ "user": SafeUser::from(&user) }));

    Ok(match removal {
        Some(cookie) => ([(SET_COOKIE, cookie.to_string())], body).into_response(),
        None => body.into_response(),
    })
}

/// Log the customer out.
#[instrument(skip(session))]
pub async fn logout(session: Session) -> Result<Json<serde_json::Value>> {
    clear_current_user(&session).await?;
    session.cycle_id().await?;
    clear_sentry_user();
    Ok(Json(json!({"message": "Logged out"})))
}

/// The signed-in customer.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn me(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<serde_json::Value>> {
    let user = UserRepository::new(state.pool())
        .get_by_id(user.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;
    Ok(Json(json!({ "user": SafeUser::from(&user) })))
}

// =============================================================================
// Helpers
// =============================================================================

/// Store `user` in the session and fold in any guest cart.
///
/// Returns the cookie that clears the guest cart once it has been merged.
/// A failed merge is logged and does not fail the login.
pub(crate) async fn establish_session(
    state: &AppState,
    session: &Session,
    headers: &HeaderMap,
    user: &User,
) -> Result<Option<Cookie<'static>>> {
    let current = CurrentUser {
        id: user.id,
        email: user.email.clone(),
    };
    set_current_user(session, &current).await?;
    set_sentry_user(&user.id, Some(user.email.as_str()));

    if !GuestCart::present_in(headers) {
        return Ok(None);
    }

    let guest = GuestCart::from_headers(headers);
    match CartService::new(state.pool())
        .merge_guest_cart(user.id, &guest)
        .await
    {
        Ok(outcome) => {
            tracing::info!(
                user_id = %user.id,
                merged = outcome.merged,
                skipped = outcome.skipped,
                already_merged = outcome.already_merged,
                "Guest cart merged"
            );
        }
        Err(e) => {
            // Keep the cookie so the cart is not lost
            tracing::warn!(user_id = %user.id, error = %e, "Guest cart merge failed");
            return Ok(None);
        }
    }

    let config = state.config();
    Ok(Some(GuestCart::removal_cookie(
        config.secure_cookies(),
        config.cookie_same_site,
    )))
}
