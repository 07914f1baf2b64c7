//! Email outbox maintenance.

use simonia_server::db::RepositoryError;
use simonia_server::db::outbox::OutboxRepository;
use thiserror::Error;

use super::{CommandError, connect};

#[derive(Debug, Error)]
pub enum OutboxError {
    #[error(transparent)]
    Connect(#[from] CommandError),

    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Log message counts by state.
pub async fn stats() -> Result<(), OutboxError> {
    let pool = connect().await?;
    let stats = OutboxRepository::new(&pool).stats().await?;

    tracing::info!("Email outbox");
    tracing::info!("  Pending: {}", stats.pending);
    tracing::info!("  Sent:    {}", stats.sent);
    tracing::info!("  Failed:  {}", stats.failed);
    Ok(())
}

/// Requeue every message that ran out of attempts.
///
/// A running server picks them up on its next poll.
pub async fn retry_failed() -> Result<(), OutboxError> {
    let pool = connect().await?;
    let requeued = OutboxRepository::new(&pool).requeue_failed().await?;

    tracing::info!(requeued, "Failed emails requeued");
    Ok(())
}
