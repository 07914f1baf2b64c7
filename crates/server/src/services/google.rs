//! Google sign-in (OAuth 2.0 authorization code flow).
//!
//! # Flow
//!
//! 1. `/api/auth/google/login` stores a random state in the session and
//!    redirects to [`GoogleClient::authorization_url`]
//! 2. Google redirects back to `/api/auth/google/callback` with `state` and `code`
//! 3. [`GoogleClient::authenticate`] exchanges the code and reads the profile
//! 4. [`resolve_user`] finds, links or creates the local account

use std::sync::Arc;

use axum::http::StatusCode;
use rand::Rng;
use rand::distr::Alphanumeric;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use simonia_core::{Email, EmailError, Phone};

use crate::config::GoogleConfig;
use crate::db::RepositoryError;
use crate::db::users::{GoogleIdentity, UserRepository};
use crate::models::User;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const PEOPLE_URL: &str = "https://people.googleapis.com/v1/people/me?personFields=phoneNumbers";

const SCOPES: &str =
    "openid email profile https://www.googleapis.com/auth/user.phonenumbers.read";

/// Length of the CSRF state parameter.
const STATE_LENGTH: usize = 32;

/// Errors from Google sign-in.
#[derive(Debug, Error)]
pub enum GoogleError {
    /// Client id/secret/redirect URL not configured.
    #[error("Google login is not configured")]
    NotConfigured,

    /// State missing from the session or different from the callback's.
    #[error("invalid OAuth state")]
    InvalidState,

    /// Callback without an authorization code.
    #[error("missing authorization code")]
    MissingCode,

    /// Google did not vouch for the email address.
    #[error("Google email not verified")]
    EmailNotVerified,

    /// Google returned an email we cannot store.
    #[error("invalid Google email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Google returned an error response.
    #[error("Google API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl GoogleError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidState | Self::MissingCode | Self::InvalidEmail(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::EmailNotVerified => StatusCode::FORBIDDEN,
            Self::Http(_) | Self::Api { .. } => StatusCode::BAD_GATEWAY,
            Self::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the client.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::NotConfigured => "Google login is not configured",
            Self::InvalidState => "Invalid OAuth state",
            Self::MissingCode => "Missing authorization code",
            Self::EmailNotVerified => "Google account email is not verified",
            Self::InvalidEmail(_) => "Google account has no usable email address",
            Self::Http(_) | Self::Api { .. } => "Google sign-in failed, please try again",
            Self::Repository(_) => "Internal server error",
        }
        .to_string()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Profile returned by the `OpenID` userinfo endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleUserInfo {
    pub sub: String,
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub name: String,
    pub picture: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PeopleResponse {
    #[serde(default)]
    phone_numbers: Vec<PeoplePhone>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PeoplePhone {
    value: Option<String>,
    canonical_form: Option<String>,
}

/// Client for Google's OAuth and profile endpoints.
#[derive(Clone)]
pub struct GoogleClient {
    inner: Arc<GoogleClientInner>,
}

struct GoogleClientInner {
    client: reqwest::Client,
    client_id: String,
    client_secret: SecretString,
    redirect_url: String,
}

impl GoogleClient {
    /// Create a new Google client.
    #[must_use]
    pub fn new(config: &GoogleConfig, client: reqwest::Client) -> Self {
        Self {
            inner: Arc::new(GoogleClientInner {
                client,
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
                redirect_url: config.redirect_url.clone(),
            }),
        }
    }

    /// URL of Google's consent screen for this `state`.
    #[must_use]
    pub fn authorization_url(&self, state: &str) -> String {
        let mut url = Url::parse(AUTH_URL).unwrap_or_else(|_| unreachable!("AUTH_URL is valid"));
        url.query_pairs_mut()
            .append_pair("client_id", &self.inner.client_id)
            .append_pair("redirect_uri", &self.inner.redirect_url)
            .append_pair("response_type", "code")
            .append_pair("scope", SCOPES)
            .append_pair("state", state)
            .append_pair("access_type", "online")
            .append_pair("prompt", "select_account");
        url.into()
    }

    /// Exchange an authorization code and read the user's identity.
    ///
    /// # Errors
    ///
    /// Returns `GoogleError::EmailNotVerified` if Google has not verified the
    /// account's email, or an HTTP/API error if any call fails.
    pub async fn authenticate(&self, code: &str) -> Result<GoogleIdentity, GoogleError> {
        let access_token = self.exchange_code(code).await?;
        let info = self.user_info(&access_token).await?;

        if !info.email_verified {
            return Err(GoogleError::EmailNotVerified);
        }
        let email = Email::parse(info.email.as_deref().unwrap_or_default())?;

        let phone = match self.phone_number(&access_token).await {
            Ok(phone) => phone,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read phone number from Google People API");
                None
            }
        };

        Ok(GoogleIdentity {
            google_id: info.sub,
            email,
            name: info.name.trim().to_string(),
            picture_url: info.picture,
            phone,
        })
    }

    async fn exchange_code(&self, code: &str) -> Result<String, GoogleError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.inner.client_id.as_str()),
            ("client_secret", self.inner.client_secret.expose_secret()),
            ("redirect_uri", self.inner.redirect_url.as_str()),
        ];

        let response = self.inner.client.post(TOKEN_URL).form(&params).send().await?;
        let token: TokenResponse = json_or_error(response).await?;
        Ok(token.access_token)
    }

    async fn user_info(&self, access_token: &str) -> Result<GoogleUserInfo, GoogleError> {
        let response = self
            .inner
            .client
            .get(USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await?;
        json_or_error(response).await
    }

    async fn phone_number(&self, access_token: &str) -> Result<Option<Phone>, GoogleError> {
        let response = self
            .inner
            .client
            .get(PEOPLE_URL)
            .bearer_auth(access_token)
            .send()
            .await?;
        let people: PeopleResponse = json_or_error(response).await?;

        Ok(people
            .phone_numbers
            .into_iter()
            .filter_map(|p| p.canonical_form.or(p.value))
            .find_map(|raw| normalize_phone(&raw)))
    }
}

async fn json_or_error<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, GoogleError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(GoogleError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response.json().await?)
}

/// Strip separators from a phone number as Google formats it.
fn normalize_phone(raw: &str) -> Option<Phone> {
    let trimmed = raw.trim();
    let mut normalized: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if trimmed.starts_with('+') {
        normalized.insert(0, '+');
    }
    Phone::parse(&normalized).ok()
}

/// Random state for the authorization request.
#[must_use]
pub fn generate_state() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_LENGTH)
        .map(char::from)
        .collect()
}

/// Find, link or create the local account for a Google identity.
///
/// Lookup order: Google id, then email (linking Google to the existing
/// account), then a new verified account without a password.
///
/// # Errors
///
/// Returns `GoogleError::Repository` if a query fails.
pub async fn resolve_user(
    users: &UserRepository<'_>,
    identity: &GoogleIdentity,
) -> Result<User, GoogleError> {
    if let Some(user) = users.get_by_google_id(&identity.google_id).await? {
        return Ok(user);
    }

    if let Some(user) = users.get_by_email(&identity.email).await? {
        let linked = users.link_google(user.id, identity).await?;
        tracing::info!(user_id = %linked.id, "Linked Google account to existing user");
        return Ok(linked);
    }

    match users.create_from_google(identity).await {
        Ok(user) => {
            tracing::info!(user_id = %user.id, "Created user from Google sign-in");
            Ok(user)
        }
        // A concurrent callback created the account first.
        Err(RepositoryError::Conflict(_)) => {
            if let Some(user) = users.get_by_google_id(&identity.google_id).await? {
                return Ok(user);
            }
            let user = users
                .get_by_email(&identity.email)
                .await?
                .ok_or(RepositoryError::NotFound)?;
            Ok(users.link_google(user.id, identity).await?)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client() -> GoogleClient {
        GoogleClient::new(
            &GoogleConfig {
                client_id: "client-123.apps.googleusercontent.com".to_string(),
                client_secret: SecretString::from("GOCSPX-k7Q2m9Xv4Lr8Tn3Wp6Zs1Yb5"),
                redirect_url: "https://api.simonia.md/api/auth/google/callback".to_string(),
            },
            reqwest::Client::new(),
        )
    }

    #[test]
    fn test_authorization_url() {
        let url = Url::parse(&client().authorization_url("abc")).unwrap();
        assert_eq!(url.host_str(), Some("accounts.google.com"));

        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "client-123.apps.googleusercontent.com");
        assert_eq!(
            pairs["redirect_uri"],
            "https://api.simonia.md/api/auth/google/callback"
        );
        assert_eq!(pairs["state"], "abc");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["access_type"], "online");
        assert_eq!(pairs["prompt"], "select_account");
        assert!(pairs["scope"].contains("user.phonenumbers.read"));
        assert!(pairs["scope"].starts_with("openid email profile"));
    }

    #[test]
    fn test_generate_state() {
        let state = generate_state();
        assert_eq!(state.len(), STATE_LENGTH);
        assert!(state.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(state, generate_state());
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(
            normalize_phone("+373 69 123 456").unwrap().as_str(),
            "+37369123456"
        );
        assert_eq!(normalize_phone("069-123-456").unwrap().as_str(), "069123456");
        assert!(normalize_phone("12").is_none());
    }

    #[test]
    fn test_userinfo_defaults() {
        let info: GoogleUserInfo =
            serde_json::from_str(r#"{"sub":"1089","email":"ana@gmail.com"}"#).unwrap();
        assert!(!info.email_verified);
        assert_eq!(info.name, "");
        assert!(info.picture.is_none());
    }

    #[test]
    fn test_error_statuses() {
        assert_eq!(
            GoogleError::NotConfigured.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(GoogleError::InvalidState.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            GoogleError::Api {
                status: 401,
                message: "invalid_grant".to_string()
            }
            .status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GoogleError::Api {
                status: 401,
                message: "invalid_grant".to_string()
            }
            .client_message(),
            "Google sign-in failed, please try again"
        );
    }
}
