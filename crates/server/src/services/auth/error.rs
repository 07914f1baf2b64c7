//! Authentication error types.

use axum::http::StatusCode;
use thiserror::Error;

use simonia_core::{EmailError, PhoneError};

use crate::db::RepositoryError;
use crate::services::email::MailError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// Invalid phone format.
    #[error("invalid phone: {0}")]
    InvalidPhone(#[from] PhoneError),

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Invalid credentials (wrong password, unknown user or password-less account).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Password is correct but the email has not been verified yet.
    #[error("email not verified")]
    EmailNotVerified,

    /// User already exists.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Verification token unknown or expired.
    #[error("invalid or expired verification token")]
    InvalidToken,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Verification email could not be rendered.
    #[error("email error: {0}")]
    Mail(#[from] MailError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}

impl AuthError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidEmail(_)
            | Self::InvalidPhone(_)
            | Self::WeakPassword(_)
            | Self::InvalidToken => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::EmailNotVerified => StatusCode::FORBIDDEN,
            Self::UserAlreadyExists => StatusCode::CONFLICT,
            Self::Repository(_) | Self::Mail(_) | Self::PasswordHash => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to the client.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::InvalidEmail(_) => "Invalid email address".to_string(),
            Self::InvalidPhone(err) => capitalize(&err.to_string()),
            Self::WeakPassword(msg) => msg.clone(),
            Self::InvalidCredentials => "Invalid credentials".to_string(),
            Self::EmailNotVerified => "Please verify your email before logging in".to_string(),
            Self::UserAlreadyExists => "An account with this email already exists".to_string(),
            Self::InvalidToken => "Invalid or expired token".to_string(),
            Self::Repository(_) | Self::Mail(_) | Self::PasswordHash => {
                "Internal server error".to_string()
            }
        }
    }
}

/// Uppercase the first letter of a validation message.
pub(crate) fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("phone number is required"), "Phone number is required");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn test_unverified_message() {
        assert_eq!(
            AuthError::EmailNotVerified.client_message(),
            "Please verify your email before logging in"
        );
        assert_eq!(AuthError::EmailNotVerified.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let err = AuthError::Repository(RepositoryError::DataCorruption("x".to_string()));
        assert_eq!(err.client_message(), "Internal server error");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
