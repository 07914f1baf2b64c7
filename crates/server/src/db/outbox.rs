//! Email outbox repository.
//!
//! Emails are written here in the same transaction as the change that caused
//! them, then delivered by [`crate::services::outbox::OutboxWorker`].
//!
//! Claiming a message leases it: `next_attempt_at` moves [`LEASE`] into the
//! future and `attempts` is incremented, so a crashed worker's messages become
//! due again on their own.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use simonia_core::{EmailKind, OrderId, OutboxId};

use super::RepositoryError;

/// How long a claimed message stays invisible to other workers.
pub const LEASE: chrono::TimeDelta = chrono::TimeDelta::seconds(60);

/// Delay before the first retry; doubles per attempt.
pub const BASE_BACKOFF: chrono::TimeDelta = chrono::TimeDelta::seconds(30);

/// Longest delay between retries.
pub const MAX_BACKOFF: chrono::TimeDelta = chrono::TimeDelta::hours(1);

/// A message to enqueue.
#[derive(Debug, Clone)]
pub struct NewEmail {
    pub kind: EmailKind,
    pub recipient: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
    pub order_id: Option<OrderId>,
}

/// A claimed outbox message.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OutboxMessage {
    pub id: OutboxId,
    pub kind: EmailKind,
    pub recipient: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
    pub order_id: Option<OrderId>,
    /// Attempts including the current one.
    pub attempts: i32,
    pub max_attempts: i32,
}

/// What happened to a message after a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Will be retried at the given time.
    Retry(DateTime<Utc>),
    /// Out of attempts; will not be retried automatically.
    GaveUp,
}

/// Counts of outbox messages by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow, serde::Serialize)]
pub struct OutboxStats {
    pub pending: i64,
    pub sent: i64,
    pub failed: i64,
}

/// Delay before retrying after `attempts` failed attempts.
#[must_use]
pub fn backoff(attempts: i32) -> chrono::TimeDelta {
    let exponent = u32::try_from(attempts.saturating_sub(1)).unwrap_or(0).min(16);
    BASE_BACKOFF
        .checked_mul(1_i32 << exponent)
        .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
}

/// Repository for outbox operations.
pub struct OutboxRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OutboxRepository<'a> {
    /// Create a new outbox repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Enqueue outside of any other transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn enqueue(&self, email: &NewEmail) -> Result<OutboxId, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        enqueue(&mut conn, email).await
    }

    /// Claim up to `limit` due messages, leasing them for [`LEASE`].
    ///
    /// Rows locked by another worker are skipped.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn claim_due(&self, limit: i64) -> Result<Vec<OutboxMessage>, RepositoryError> {
        let messages = sqlx::query_as::<_, OutboxMessage>(
            r"
            WITH due AS (
                SELECT id FROM email_outbox
                WHERE sent_at IS NULL
                  AND failed_at IS NULL
                  AND next_attempt_at <= now()
                ORDER BY next_attempt_at, id
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE email_outbox o
            SET attempts = o.attempts + 1,
                next_attempt_at = now() + $2
            FROM due
            WHERE o.id = due.id
            RETURNING o.id, o.kind, o.recipient, o.subject, o.html_body, o.text_body,
                      o.order_id, o.attempts, o.max_attempts
            ",
        )
        .bind(limit)
        .bind(LEASE)
        .fetch_all(self.pool)
        .await?;
        Ok(messages)
    }

    /// Mark a message as delivered.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn mark_sent(&self, id: OutboxId) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE email_outbox SET sent_at = now(), last_error = NULL WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Record a failed delivery and schedule a retry or give up.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn mark_failed(
        &self,
        message: &OutboxMessage,
        error: &str,
    ) -> Result<FailureOutcome, RepositoryError> {
        if message.attempts >= message.max_attempts {
            sqlx::query("UPDATE email_outbox SET failed_at = now(), last_error = $2 WHERE id = $1")
                .bind(message.id)
                .bind(error)
                .execute(self.pool)
                .await?;
            return Ok(FailureOutcome::GaveUp);
        }

        let retry_at = Utc::now() + backoff(message.attempts);
        sqlx::query("UPDATE email_outbox SET next_attempt_at = $2, last_error = $3 WHERE id = $1")
            .bind(message.id)
            .bind(retry_at)
            .bind(error)
            .execute(self.pool)
            .await?;
        Ok(FailureOutcome::Retry(retry_at))
    }

    /// Make the latest notification of an order due again with fresh attempts.
    ///
    /// Returns `false` if the order has no notification in the outbox.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn requeue_for_order(&self, order_id: OrderId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE email_outbox
            SET sent_at = NULL, failed_at = NULL, attempts = 0,
                next_attempt_at = now(), last_error = NULL
            WHERE id = (
                SELECT id FROM email_outbox
                WHERE order_id = $1 AND kind = 'order_notification'
                ORDER BY id DESC
                LIMIT 1
            )
            ",
        )
        .bind(order_id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Give every failed message a fresh set of attempts.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn requeue_failed(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE email_outbox
            SET failed_at = NULL, last_error = NULL, attempts = 0, next_attempt_at = now()
            WHERE failed_at IS NOT NULL AND sent_at IS NULL
            ",
        )
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Message counts by state.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn stats(&self) -> Result<OutboxStats, RepositoryError> {
        let stats = sqlx::query_as::<_, OutboxStats>(
            r"
            SELECT
                COUNT(*) FILTER (WHERE sent_at IS NULL AND failed_at IS NULL) AS pending,
                COUNT(*) FILTER (WHERE sent_at IS NOT NULL) AS sent,
                COUNT(*) FILTER (WHERE failed_at IS NOT NULL AND sent_at IS NULL) AS failed
            FROM email_outbox
            ",
        )
        .fetch_one(self.pool)
        .await?;
        Ok(stats)
    }
}

/// Enqueue a message inside the caller's transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn enqueue(conn: &mut PgConnection, email: &NewEmail) -> Result<OutboxId, RepositoryError> {
    let id: OutboxId = sqlx::query_scalar(
        r"
        INSERT INTO email_outbox (kind, recipient, subject, html_body, text_body, order_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        ",
    )
    .bind(email.kind)
    .bind(&email.recipient)
    .bind(&email.subject)
    .bind(&email.html_body)
    .bind(&email.text_body)
    .bind(email.order_id)
    .fetch_one(conn)
    .await?;
    Ok(id)
}
