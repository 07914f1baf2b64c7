//! Background delivery of the email outbox.
//!
//! The worker sleeps until either an enqueue wakes it through the shared
//! [`Notify`] or the poll interval elapses, then drains due messages in
//! batches. Order notification outcomes are mirrored onto the order row so the
//! back office can show `email_sent` / `email_error`.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::{Notify, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use simonia_core::EmailKind;

use crate::db::RepositoryError;
use crate::db::orders::OrderRepository;
use crate::db::outbox::{FailureOutcome, OutboxMessage, OutboxRepository};
use crate::services::email::EmailService;

/// Messages claimed per round trip.
const BATCH_SIZE: i64 = 10;

/// Delivers queued emails until shutdown.
pub struct OutboxWorker {
    pool: PgPool,
    email: EmailService,
    wake: Arc<Notify>,
    poll_interval: Duration,
}

impl OutboxWorker {
    /// Create a worker.
    #[must_use]
    pub const fn new(
        pool: PgPool,
        email: EmailService,
        wake: Arc<Notify>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            pool,
            email,
            wake,
            poll_interval,
        }
    }

    /// Start the worker as a background task.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Run until the shutdown flag flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            poll_secs = self.poll_interval.as_secs(),
            "Email outbox worker started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = self.wake.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }

            if let Err(e) = self.drain().await {
                error!(error = %e, "Email outbox poll failed");
            }
        }

        info!("Email outbox worker stopped");
    }

    /// Deliver due messages until a batch comes back short.
    async fn drain(&self) -> Result<(), RepositoryError> {
        let outbox = OutboxRepository::new(&self.pool);
        loop {
            let batch = outbox.claim_due(BATCH_SIZE).await?;
            let claimed = batch.len();
            if claimed > 0 {
                debug!(claimed, "Claimed outbox messages");
            }

            for message in &batch {
                self.process(message).await?;
            }

            if i64::try_from(claimed).unwrap_or(i64::MAX) < BATCH_SIZE {
                return Ok(());
            }
        }
    }

    #[instrument(skip_all, fields(outbox_id = %message.id, kind = %message.kind, attempt = message.attempts))]
    async fn process(&self, message: &OutboxMessage) -> Result<(), RepositoryError> {
        let outbox = OutboxRepository::new(&self.pool);

        match self.email.deliver(message).await {
            Ok(()) => {
                outbox.mark_sent(message.id).await?;
                info!("Email delivered");
                self.mirror(message, true, None).await;
            }
            Err(e) => {
                let reason = e.to_string();
                match outbox.mark_failed(message, &reason).await? {
                    FailureOutcome::Retry(at) => {
                        warn!(error = %reason, retry_at = %at, "Email delivery failed, will retry");
                    }
                    FailureOutcome::GaveUp => {
                        error!(error = %reason, "Email delivery failed permanently");
                    }
                }
                self.mirror(message, false, Some(&reason)).await;
            }
        }
        Ok(())
    }

    /// Copy the delivery result onto the order it belongs to.
    async fn mirror(&self, message: &OutboxMessage, sent: bool, error: Option<&str>) {
        let (EmailKind::OrderNotification, Some(order_id)) = (message.kind, message.order_id)
        else {
            return;
        };

        if let Err(e) = OrderRepository::new(&self.pool)
            .set_email_status(order_id, sent, error)
            .await
        {
            warn!(order_id = %order_id, error = %e, "Failed to record email status on order");
        }
    }
}
