//! Customer account.

use chrono::{DateTime, Utc};
use serde::Serialize;

use simonia_core::{Email, UserId};

/// A customer account row.
///
/// Contains the password hash and verification token, so it is never
/// serialized; handlers respond with [`SafeUser`].
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    pub name: String,
    pub phone: Option<String>,
    pub password_hash: Option<String>,
    pub is_verified: bool,
    pub verification_token: Option<String>,
    pub verification_expires_at: Option<DateTime<Utc>>,
    pub google_id: Option<String>,
    pub picture_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public view of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafeUser {
    pub id: UserId,
    pub email: Email,
    pub name: String,
    pub phone: Option<String>,
    pub is_verified: bool,
    pub picture_url: Option<String>,
    pub has_password: bool,
    pub has_google: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for SafeUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            phone: user.phone.clone(),
            is_verified: user.is_verified,
            picture_url: user.picture_url.clone(),
            has_password: user.password_hash.is_some(),
            has_google: user.google_id.is_some(),
            created_at: user.created_at,
        }
    }
}

impl From<User> for SafeUser {
    fn from(user: User) -> Self {
        Self::from(&user)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_user_hides_secrets() {
        let now = Utc::now();
        let user = User {
            id: UserId::new(3),
            email: Email::parse("ana@mail.md").unwrap(),
            name: "Ana".to_string(),
            phone: Some("+37369123456".to_string()),
            password_hash: Some("$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".to_string()),
            is_verified: false,
            verification_token: Some("deadbeef".to_string()),
            verification_expires_at: Some(now),
            google_id: None,
            picture_url: None,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_string(&SafeUser::from(&user)).unwrap();
        assert!(json.contains("\"has_password\":true"));
        assert!(json.contains("\"has_google\":false"));
        assert!(!json.contains("argon2id"));
        assert!(!json.contains("deadbeef"));
    }
}
