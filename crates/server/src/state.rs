//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::Notify;

use crate::config::ServerConfig;
use crate::services::email::{EmailService, MailError};
use crate::services::google::{GoogleClient, GoogleError};
use crate::services::uploads::UploadStore;

/// Timeout for calls to Google.
const GOOGLE_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Error building application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("email setup failed: {0}")]
    Mail(#[from] MailError),
    #[error("HTTP client setup failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    pool: PgPool,
    email: EmailService,
    google: Option<GoogleClient>,
    uploads: UploadStore,
    outbox_wake: Arc<Notify>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the mail transport or HTTP client cannot be built.
    pub fn new(config: ServerConfig, pool: PgPool) -> Result<Self, StateError> {
        let email = EmailService::new(&config.email, &config.base_url)?;

        let google = match &config.google {
            Some(google) => {
                let http = reqwest::Client::builder()
                    .timeout(GOOGLE_HTTP_TIMEOUT)
                    .build()?;
                Some(GoogleClient::new(google, http))
            }
            None => None,
        };

        let uploads = UploadStore::new(config.uploads_dir.clone());

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                email,
                google,
                uploads,
                outbox_wake: Arc::new(Notify::new()),
            }),
        })
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the email service.
    #[must_use]
    pub fn email(&self) -> &EmailService {
        &self.inner.email
    }

    /// Google client, if Google login is configured.
    ///
    /// # Errors
    ///
    /// Returns `GoogleError::NotConfigured` when it is not.
    pub fn google(&self) -> Result<&GoogleClient, GoogleError> {
        self.inner.google.as_ref().ok_or(GoogleError::NotConfigured)
    }

    /// Get a reference to the upload store.
    #[must_use]
    pub fn uploads(&self) -> &UploadStore {
        &self.inner.uploads
    }

    /// Handle the outbox worker waits on.
    #[must_use]
    pub fn outbox_wake(&self) -> Arc<Notify> {
        Arc::clone(&self.inner.outbox_wake)
    }

    /// Tell the outbox worker that new mail was committed.
    pub fn wake_outbox(&self) {
        self.inner.outbox_wake.notify_one();
    }
}
