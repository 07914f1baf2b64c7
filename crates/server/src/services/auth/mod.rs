//! Authentication service.
//!
//! Password registration with email verification, password login, and the
//! single back-office admin account. Google sign-in lives in
//! [`crate::services::google`].

mod error;

use std::sync::LazyLock;

pub use error::AuthError;
pub(crate) use error::capitalize;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{TimeDelta, Utc};
use rand::RngCore;
use secrecy::ExposeSecret;
use sqlx::PgPool;

use simonia_core::{Email, Phone};

use crate::config::AdminConfig;
use crate::db::users::{self, NewPasswordUser, UserRepository};
use crate::db::{RepositoryError, outbox};
use crate::models::User;
use crate::services::email::{EmailService, VERIFICATION_TTL_HOURS};

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 6;

/// Maximum password length; bounds hashing cost.
const MAX_PASSWORD_LENGTH: usize = 128;

/// Random bytes in a verification token (hex-encoded to twice as many chars).
const TOKEN_BYTES: usize = 24;

/// A validated registration request.
#[derive(Debug, Clone)]
pub struct Registration {
    pub email: Email,
    pub name: String,
    pub phone: Phone,
    password: String,
}

impl Registration {
    /// Validate raw registration input.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail`, `AuthError::InvalidPhone` or
    /// `AuthError::WeakPassword` for the first invalid field.
    pub fn parse(email: &str, password: &str, name: &str, phone: &str) -> Result<Self, AuthError> {
        let email = Email::parse(email)?;
        validate_password(password)?;
        let phone = Phone::parse(phone)?;
        Ok(Self {
            email,
            name: name.trim().to_string(),
            phone,
            password: password.to_string(),
        })
    }
}

/// Authentication service.
pub struct AuthService<'a> {
    pool: &'a PgPool,
    users: UserRepository<'a>,
    email: &'a EmailService,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool, email: &'a EmailService) -> Self {
        Self {
            pool,
            users: UserRepository::new(pool),
            email,
        }
    }

    /// Register a new user and enqueue their verification email.
    ///
    /// The user row and the outbox message are written in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    pub async fn register(&self, registration: &Registration) -> Result<User, AuthError> {
        let password_hash = hash_password(&registration.password)?;
        let token = generate_token();
        let expires_at = Utc::now() + TimeDelta::hours(VERIFICATION_TTL_HOURS);
        let message =
            self.email
                .verification_email(&registration.email, &registration.name, &token)?;

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        let user = users::insert_password_user(
            &mut tx,
            &NewPasswordUser {
                email: &registration.email,
                name: &registration.name,
                phone: &registration.phone,
                password_hash: &password_hash,
                verification_token: &token,
                verification_expires_at: expires_at,
            },
        )
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
            other => AuthError::Repository(other),
        })?;
        outbox::enqueue(&mut tx, &message).await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        tracing::info!(user_id = %user.id, "User registered, verification email queued");
        Ok(user)
    }

    /// Consume a verification token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` for unknown or expired tokens.
    pub async fn verify_email(&self, token: &str) -> Result<User, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::InvalidToken);
        }
        let user = self
            .users
            .verify_by_token(token)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        tracing::info!(user_id = %user.id, "Email verified");
        Ok(user)
    }

    /// Issue a fresh verification token for an unverified account.
    ///
    /// Returns `false` when there is nothing to send (unknown or already
    /// verified account); callers must not reveal which.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` for malformed addresses.
    pub async fn resend_verification(&self, email: &str) -> Result<bool, AuthError> {
        let email = Email::parse(email)?;
        let Some(user) = self.users.get_by_email(&email).await? else {
            return Ok(false);
        };
        if user.is_verified {
            return Ok(false);
        }

        let token = generate_token();
        let expires_at = Utc::now() + TimeDelta::hours(VERIFICATION_TTL_HOURS);
        let message = self.email.verification_email(&user.email, &user.name, &token)?;

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        let reissued = users::reissue_verification_token(&mut tx, user.id, &token, expires_at).await?;
        if reissued {
            outbox::enqueue(&mut tx, &message).await?;
        }
        tx.commit().await.map_err(RepositoryError::from)?;

        Ok(reissued)
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong
    /// and `AuthError::EmailNotVerified` if the password is right but the
    /// account is not verified yet.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let Some(user) = self
            .users
            .get_by_email(&email)
            .await?
            .filter(|u| u.password_hash.is_some())
        else {
            // Same argon2 cost as a real check so timing does not reveal the account
            let _ = verify_password(password, dummy_hash());
            return Err(AuthError::InvalidCredentials);
        };

        verify_password(password, user.password_hash.as_deref().unwrap_or_default())?;

        if !user.is_verified {
            return Err(AuthError::EmailNotVerified);
        }
        Ok(user)
    }
}

/// Check back-office credentials against the configured admin account.
///
/// # Errors
///
/// Returns `AuthError::InvalidCredentials` on any mismatch.
pub fn verify_admin(config: &AdminConfig, username: &str, password: &str) -> Result<(), AuthError> {
    let username_ok = constant_time_compare(username.trim(), &config.username);
    let password_ok = verify_password(password, config.password_hash.expose_secret()).is_ok();
    if username_ok && password_ok {
        Ok(())
    } else {
        Err(AuthError::InvalidCredentials)
    }
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if length > MAX_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "Password must be at most {MAX_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Hash checked when the account is unknown or has no password.
fn dummy_hash() -> &'static str {
    static DUMMY_HASH: LazyLock<String> =
        LazyLock::new(|| hash_password(&generate_token()).unwrap_or_default());
    &DUMMY_HASH
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

/// Generate a random hex token.
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0_u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("parola123").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("parola123", &hash).is_ok());
        assert!(matches!(
            verify_password("parola124", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_dummy_hash_costs_a_real_check() {
        let hash = dummy_hash();
        assert!(hash.starts_with("$argon2id$"));
        assert!(PasswordHash::new(hash).is_ok());
        assert!(std::ptr::eq(hash, dummy_hash()));
        assert!(matches!(
            verify_password("parola123", hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_verify_password_malformed_hash() {
        assert!(matches!(
            verify_password("anything", "not-a-hash"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_validate_password_bounds() {
        assert!(validate_password("12345").is_err());
        assert!(validate_password("123456").is_ok());
        assert!(validate_password(&"x".repeat(128)).is_ok());
        assert!(validate_password(&"x".repeat(129)).is_err());
    }

    #[test]
    fn test_registration_parse() {
        let registration =
            Registration::parse(" Ana@Mail.MD ", "secret1", "  Ana ", "+37369123456").unwrap();
        assert_eq!(registration.email.as_str(), "ana@mail.md");
        assert_eq!(registration.name, "Ana");
        assert_eq!(registration.phone.as_str(), "+37369123456");
    }

    #[test]
    fn test_registration_requires_phone() {
        let err = Registration::parse("ana@mail.md", "secret1", "Ana", "").unwrap_err();
        assert!(matches!(err, AuthError::InvalidPhone(_)));
        assert_eq!(err.client_message(), "Phone number is required");
    }

    #[test]
    fn test_registration_rejects_bad_email() {
        let err = Registration::parse("ana", "secret1", "", "069123456").unwrap_err();
        assert!(matches!(err, AuthError::InvalidEmail(_)));
    }

    #[test]
    fn test_generate_token_format() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("admin", "admin"));
        assert!(constant_time_compare("", ""));
        assert!(!constant_time_compare("admin", "admim"));
        assert!(!constant_time_compare("admin", "admin2"));
    }

    #[test]
    fn test_verify_admin() {
        let config = AdminConfig {
            username: "admin".to_string(),
            password_hash: SecretString::from(hash_password("correct horse").unwrap()),
        };
        assert!(verify_admin(&config, "admin", "correct horse").is_ok());
        assert!(verify_admin(&config, "admin", "wrong horse").is_err());
        assert!(verify_admin(&config, "root", "correct horse").is_err());
    }
}
