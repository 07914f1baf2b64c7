//! Email outbox maintenance against the live database.
//!
//! Run with: `cargo test -p simonia-integration-tests -- --ignored`

#![allow(clippy::unwrap_used, clippy::expect_used)]

use simonia_integration_tests::{TestContext, unique_email};
use simonia_server::db::outbox::OutboxRepository;

#[tokio::test]
#[ignore = "Requires running server and database"]
async fn test_requeue_failed_clears_last_error() {
    let ctx = TestContext::new().await;
    let recipient = unique_email();

    let id: i64 = sqlx::query_scalar(
        r"
        INSERT INTO email_outbox
            (kind, recipient, subject, html_body, text_body,
             attempts, last_error, failed_at)
        VALUES ('verify_email', $1, 'Confirmă adresa', '<p>x</p>', 'x',
                5, 'smtp: connection refused', now())
        RETURNING id
        ",
    )
    .bind(&recipient)
    .fetch_one(&ctx.pool)
    .await
    .unwrap();

    let requeued = OutboxRepository::new(&ctx.pool).requeue_failed().await.unwrap();
    assert!(requeued >= 1);

    let (failed, last_error): (bool, Option<String>) = sqlx::query_as(
        "SELECT failed_at IS NOT NULL, last_error FROM email_outbox WHERE id = $1",
    )
    .bind(id)
    .fetch_one(&ctx.pool)
    .await
    .unwrap();
    assert!(!failed);
    assert_eq!(last_error, None);
}
