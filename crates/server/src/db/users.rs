//! User repository for database operations.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use simonia_core::{Email, Phone, UserId};

use super::{Page, RepositoryError, escape_like};
use crate::models::User;

const USER_COLUMNS: &str = "id, email, name, phone, password_hash, is_verified, \
     verification_token, verification_expires_at, google_id, picture_url, created_at, updated_at";

const DUPLICATE_EMAIL: &str = "An account with this email already exists";

/// Fields for a password registration.
#[derive(Debug, Clone)]
pub struct NewPasswordUser<'a> {
    pub email: &'a Email,
    pub name: &'a str,
    pub phone: &'a Phone,
    pub password_hash: &'a str,
    pub verification_token: &'a str,
    pub verification_expires_at: DateTime<Utc>,
}

/// Identity returned by Google, used to create or link accounts.
#[derive(Debug, Clone)]
pub struct GoogleIdentity {
    pub google_id: String,
    pub email: Email,
    pub name: String,
    pub picture_url: Option<String>,
    pub phone: Option<Phone>,
}

/// Filters accepted by the admin user list.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub ids: Vec<UserId>,
    pub q: Option<String>,
    pub is_verified: Option<bool>,
}

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user by their ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(user)
    }

    /// Get a user by their (normalized) email address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(self.pool)
            .await?;
        Ok(user)
    }

    /// Get a user by their Google subject id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_google_id(&self, google_id: &str) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE google_id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(google_id)
            .fetch_optional(self.pool)
            .await?;
        Ok(user)
    }

    /// Mark the user owning `token` as verified, if the token has not expired.
    ///
    /// Returns `None` for unknown or expired tokens.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn verify_by_token(&self, token: &str) -> Result<Option<User>, RepositoryError> {
        let sql = format!(
            "UPDATE users \
             SET is_verified = TRUE, verification_token = NULL, verification_expires_at = NULL \
             WHERE verification_token = $1 AND verification_expires_at > now() \
             RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(token)
            .fetch_optional(self.pool)
            .await?;
        Ok(user)
    }

    /// Create Google-linked, verified user without a password.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email or Google id is taken.
    pub async fn create_from_google(
        &self,
        identity: &GoogleIdentity,
    ) -> Result<User, RepositoryError> {
        let sql = format!(
            "INSERT INTO users (email, name, phone, is_verified, google_id, picture_url) \
             VALUES ($1, $2, $3, TRUE, $4, $5) \
             RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&identity.email)
            .bind(&identity.name)
            .bind(identity.phone.as_ref().map(Phone::as_str))
            .bind(&identity.google_id)
            .bind(&identity.picture_url)
            .fetch_one(self.pool)
            .await
            .map_err(|e| RepositoryError::unique_violation(e, DUPLICATE_EMAIL))
    }

    /// Link a Google identity to an existing account.
    ///
    /// The account becomes verified (Google vouched for the email), the
    /// picture is refreshed and the phone is only filled in when empty.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user no longer exists.
    pub async fn link_google(
        &self,
        id: UserId,
        identity: &GoogleIdentity,
    ) -> Result<User, RepositoryError> {
        let sql = format!(
            "UPDATE users \
             SET google_id = $2, \
                 picture_url = COALESCE($3, picture_url), \
                 phone = COALESCE(NULLIF(phone, ''), $4), \
                 name = CASE WHEN name = '' THEN $5 ELSE name END, \
                 is_verified = TRUE, \
                 verification_token = NULL, \
                 verification_expires_at = NULL \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(&identity.google_id)
            .bind(&identity.picture_url)
            .bind(identity.phone.as_ref().map(Phone::as_str))
            .bind(&identity.name)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| RepositoryError::unique_violation(e, "Google account already linked"))?
            .ok_or(RepositoryError::NotFound)
    }

    /// Delete a user. Their cart goes with them; orders keep `user_id = NULL`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn delete(&self, id: UserId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// One page of users for the admin list, plus the total match count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_page(
        &self,
        filter: &UserFilter,
        page: &Page,
    ) -> Result<(Vec<User>, i64), RepositoryError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
        push_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {USER_COLUMNS} FROM users"));
        push_filter(&mut select, filter);
        page.push_order_and_limit(&mut select, "id");
        let rows = select.build_query_as::<User>().fetch_all(self.pool).await?;

        Ok((rows, total))
    }
}

// =============================================================================
// Transaction-scoped operations
// =============================================================================

/// Insert a password user with a pending verification token.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the email already exists.
pub async fn insert_password_user(
    conn: &mut PgConnection,
    user: &NewPasswordUser<'_>,
) -> Result<User, RepositoryError> {
    let sql = format!(
        "INSERT INTO users \
             (email, name, phone, password_hash, verification_token, verification_expires_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING {USER_COLUMNS}"
    );
    sqlx::query_as::<_, User>(&sql)
        .bind(user.email)
        .bind(user.name)
        .bind(user.phone.as_str())
        .bind(user.password_hash)
        .bind(user.verification_token)
        .bind(user.verification_expires_at)
        .fetch_one(conn)
        .await
        .map_err(|e| RepositoryError::unique_violation(e, DUPLICATE_EMAIL))
}

/// Replace the verification token of an unverified user.
///
/// Returns `false` when the user is already verified.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn reissue_verification_token(
    conn: &mut PgConnection,
    id: UserId,
    token: &str,
    expires_at: DateTime<Utc>,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE users
        SET verification_token = $2, verification_expires_at = $3
        WHERE id = $1 AND NOT is_verified
        ",
    )
    .bind(id)
    .bind(token)
    .bind(expires_at)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Lock the user row until the transaction ends.
///
/// Cart merge and cart sync take this lock first so that the two never
/// interleave for one user. Returns `false` if the user does not exist.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_user(conn: &mut PgConnection, id: UserId) -> Result<bool, RepositoryError> {
    let locked: Option<UserId> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(locked.is_some())
}

/// Store the phone given at checkout on the user's account.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn update_phone(
    conn: &mut PgConnection,
    id: UserId,
    phone: &Phone,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE users SET phone = $2 WHERE id = $1 AND phone IS DISTINCT FROM $2")
        .bind(id)
        .bind(phone.as_str())
        .execute(conn)
        .await?;
    Ok(())
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter) {
    qb.push(" WHERE TRUE");
    if !filter.ids.is_empty() {
        qb.push(" AND id = ANY(").push_bind(filter.ids.clone()).push(")");
    }
    if let Some(q) = filter.q.as_deref().filter(|q| !q.trim().is_empty()) {
        let pattern = format!("%{}%", escape_like(q.trim()));
        qb.push(" AND (email LIKE lower(")
            .push_bind(pattern.clone())
            .push(") OR unaccent(lower(name)) LIKE unaccent(lower(")
            .push_bind(pattern.clone())
            .push(")) OR phone LIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(is_verified) = filter.is_verified {
        qb.push(" AND is_verified = ").push_bind(is_verified);
    }
}
