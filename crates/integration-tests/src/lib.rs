//! Integration tests for the Simonia shop API.
//!
//! The tests drive a running server over HTTP and read verification tokens
//! straight from its database, so they are `#[ignore]`d by default.
//!
//! # Running Tests
//!
//! ```bash
//! cargo run -p simonia-cli -- migrate
//! cargo run -p simonia-cli -- seed
//! cargo run -p simonia-server &
//! cargo test -p simonia-integration-tests -- --ignored
//! ```
//!
//! # Environment Variables
//!
//! - `SIMONIA_TEST_BASE_URL` - server under test (default `http://localhost:8080`)
//! - `SIMONIA_DATABASE_URL` / `DATABASE_URL` - the server's database
//! - `SIMONIA_TEST_ADMIN_USERNAME` / `SIMONIA_TEST_ADMIN_PASSWORD` - admin login

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::missing_panics_doc, clippy::expect_used)]

use reqwest::Client;
use serde_json::{Value, json};
use sqlx::PgPool;
use uuid::Uuid;

/// Shared handles for one test.
pub struct TestContext {
    /// Client with its own cookie jar (one per simulated browser).
    pub client: Client,
    pub base_url: String,
    pub pool: PgPool,
}

impl TestContext {
    /// Connect to the server and its database.
    pub async fn new() -> Self {
        dotenvy::dotenv().ok();

        let base_url = std::env::var("SIMONIA_TEST_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8080".to_string());
        let database_url = std::env::var("SIMONIA_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .expect("SIMONIA_DATABASE_URL or DATABASE_URL must be set");
        let pool = PgPool::connect(&database_url)
            .await
            .expect("Failed to connect to database");

        Self {
            client: new_client(),
            base_url,
            pool,
        }
    }

    /// Absolute URL for an API path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Id of some active product from the seeded catalog.
    pub async fn any_product_id(&self) -> i32 {
        let products: Value = self
            .client
            .get(self.url("/api/products"))
            .send()
            .await
            .expect("Failed to list products")
            .json()
            .await
            .expect("Products response is not JSON");
        products[0]["id"]
            .as_i64()
            .and_then(|id| i32::try_from(id).ok())
            .expect("No products; run `simonia seed` first")
    }

    /// Register, verify and log in a fresh customer. Returns the email.
    pub async fn verified_customer(&self) -> String {
        let email = unique_email();
        let resp = self
            .client
            .post(self.url("/api/register"))
            .json(&json!({
                "email": email,
                "password": TEST_PASSWORD,
                "name": "ion popescu",
                "phone": "+37369123456",
            }))
            .send()
            .await
            .expect("Failed to register");
        assert_eq!(resp.status(), 201);

        let token = self.verification_token(&email).await;
        let resp = self
            .client
            .get(self.url("/api/verify"))
            .query(&[("token", token.as_str())])
            .send()
            .await
            .expect("Failed to verify");
        assert_eq!(resp.status(), 200);

        self.login(&email).await;
        email
    }

    /// Log in with the test password.
    pub async fn login(&self, email: &str) -> Value {
        let resp = self
            .client
            .post(self.url("/api/login"))
            .json(&json!({"email": email, "password": TEST_PASSWORD}))
            .send()
            .await
            .expect("Failed to log in");
        assert_eq!(resp.status(), 200);
        resp.json().await.expect("Login response is not JSON")
    }

    /// Pending verification token for `email`.
    pub async fn verification_token(&self, email: &str) -> String {
        sqlx::query_scalar::<_, Option<String>>(
            "SELECT verification_token FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .expect("User not found")
        .expect("User has no pending verification token")
    }
}

/// Password used for every test customer.
pub const TEST_PASSWORD: &str = "parola-sigura-42";

/// Client that keeps cookies between requests.
#[must_use]
pub fn new_client() -> Client {
    Client::builder()
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to create HTTP client")
}

/// Email address no other test run uses.
#[must_use]
pub fn unique_email() -> String {
    format!("test-{}@example.com", Uuid::new_v4().simple())
}
