//! Google sign-in routes.

use axum::{
    extract::State,
    http::{HeaderMap, header::SET_COOKIE},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::db::UserRepository;
use crate::error::Result;
use crate::extract::ApiQuery;
use crate::models::session_keys;
use crate::routes::auth::establish_session;
use crate::services::google::{GoogleError, generate_state, resolve_user};
use crate::state::AppState;

/// Query parameters Google sends to the callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
}

/// Start Google sign-in.
#[instrument(skip(state, session))]
pub async fn login(State(state): State<AppState>, session: Session) -> Result<Redirect> {
    let google = state.google()?;

    let oauth_state = generate_state();
    session
        .insert(session_keys::GOOGLE_OAUTH_STATE, &oauth_state)
        .await?;

    Ok(Redirect::temporary(&google.authorization_url(&oauth_state)))
}

/// Finish Google sign-in and send the browser back to the storefront.
#[instrument(skip(state, session, headers, query))]
pub async fn callback(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<CallbackQuery>,
) -> Result<Response> {
    let google = state.google()?;

    // One-shot: the stored state is consumed whatever happens next
    let expected: Option<String> = session.remove(session_keys::GOOGLE_OAUTH_STATE).await?;
    match (expected, query.state.as_deref()) {
        (Some(expected), Some(received)) if expected == received => {}
        _ => return Err(GoogleError::InvalidState.into()),
    }

    let frontend = &state.config().frontend_url;
    if let Some(error) = query.error.as_deref() {
        tracing::info!(error, "Google sign-in was not completed");
        return Ok(Redirect::to(&format!("{frontend}/login?error=access_denied")).into_response());
    }

    let code = query
        .code
        .as_deref()
        .filter(|code| !code.is_empty())
        .ok_or(GoogleError::MissingCode)?;

    let identity = google.authenticate(code).await?;
    let user = resolve_user(&UserRepository::new(state.pool()), &identity).await?;
    let removal = establish_session(&state, &session, &headers, &user).await?;

    tracing::info!(user_id = %user.id, "Signed in with Google");

    let redirect = Redirect::to(&format!("{frontend}/account"));
    Ok(match removal {
        Some(cookie) => ([(SET_COOKIE, cookie.to_string())], redirect).into_response(),
        None => redirect.into_response(),
    })
}
