//! Back-office login.

use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::json;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::extract::ApiJson;
use crate::middleware::{RequireAdmin, clear_current_admin, set_current_admin};
use crate::models::CurrentAdmin;
use crate::services::auth::verify_admin;
use crate::state::AppState;

/// Admin login request.
#[derive(Debug, Deserialize)]
pub struct AdminLoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Log the admin in.
#[instrument(skip(state, session, request))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    ApiJson(request): ApiJson<AdminLoginRequest>,
) -> Result<Json<serde_json::Value>> {
    let admin_config = &state.config().admin;
    if verify_admin(admin_config, &request.username, &request.password).is_err() {
        tracing::warn!("Failed admin login attempt");
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    }

    let admin = CurrentAdmin {
        username: admin_config.username.clone(),
    };
    set_current_admin(&session, &admin).await?;
    tracing::info!(username = %admin.username, "Admin logged in");

    Ok(Json(json!({
        "message": "Login successful",
        "username": admin.username,
    })))
}

/// Log the admin out.
#[instrument(skip(session))]
pub async fn logout(session: Session) -> Result<Json<serde_json::Value>> {
    clear_current_admin(&session).await?;
    Ok(Json(json!({"message": "Logged out"})))
}

/// The logged-in admin.
pub async fn me(RequireAdmin(admin): RequireAdmin) -> Json<serde_json::Value> {
    Json(json!({ "username": admin.username }))
}
