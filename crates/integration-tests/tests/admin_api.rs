//! Back-office API: login, product CRUD and list conventions.
//!
//! These tests require:
//! - A migrated and seeded database
//! - The server running (`cargo run -p simonia-server`)
//! - `SIMONIA_TEST_ADMIN_PASSWORD` matching the server's `ADMIN_PASSWORD_HASH`
//!
//! Run with: `cargo test -p simonia-integration-tests -- --ignored`

#![allow(clippy::unwrap_used, clippy::expect_used)]

use reqwest::StatusCode;
use serde_json::{Value, json};
use simonia_integration_tests::TestContext;
use uuid::Uuid;

async fn admin_context() -> TestContext {
    let ctx = TestContext::new().await;
    let username =
        std::env::var("SIMONIA_TEST_ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string());
    let password = std::env::var("SIMONIA_TEST_ADMIN_PASSWORD")
        .expect("SIMONIA_TEST_ADMIN_PASSWORD must be set");

    let resp = ctx
        .client
        .post(ctx.url("/api/admin/login"))
        .json(&json!({"username": username, "password": password}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    ctx
}

#[tokio::test]
#[ignore = "Requires running server and database"]
async fn test_admin_requires_login() {
    let ctx = TestContext::new().await;
    let resp = ctx
        .client
        .get(ctx.url("/api/admin/orders"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore = "Requires running server and database"]
async fn test_product_list_content_range() {
    let ctx = admin_context().await;

    let resp = ctx
        .client
        .get(ctx.url("/api/admin/products"))
        .query(&[("range", "[0,4]"), ("sort", r#"["price","ASC"]"#)])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let range = resp.headers()["content-range"].to_str().unwrap().to_string();
    assert!(range.starts_with("products 0-4/"), "{range}");

    let rows: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(rows.len(), 5);
    let prices: Vec<i64> = rows
        .iter()
        .map(|r| r["price_cents"].as_i64().unwrap())
        .collect();
    assert!(prices.windows(2).all(|w| w[0] <= w[1]));

    let resp = ctx
        .client
        .get(ctx.url("/api/admin/products"))
        .query(&[("sort", r#"["password","ASC"]"#)])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore = "Requires running server and database"]
async fn test_product_crud() {
    let ctx = admin_context().await;
    let name = format!("Test Masă {}", Uuid::new_v4().simple());

    let resp = ctx
        .client
        .post(ctx.url("/api/admin/products"))
        .json(&json!({
            "name": name,
            "description": "Masă de test",
            "price": 1299.5,
            "image_urls": ["/uploads/products/masa.jpg"],
            "dimensions": "160x90x75 cm",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = resp.json().await.unwrap();
    let id = created["id"].as_i64().unwrap();
    assert_eq!(created["price_cents"], 129_950);

    let resp = ctx
        .client
        .put(ctx.url(&format!("/api/admin/products/{id}")))
        .json(&json!({"is_active": false, "dimensions": null}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: Value = resp.json().await.unwrap();
    assert_eq!(updated["is_active"], false);
    assert!(updated["dimensions"].is_null());
    assert_eq!(updated["name"], name);

    // Inactive products drop out of the storefront listing
    let listed: Vec<Value> = ctx
        .client
        .get(ctx.url("/api/products"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(listed.iter().all(|p| p["id"] != id));

    let resp = ctx
        .client
        .delete(ctx.url(&format!("/api/admin/products/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = ctx
        .client
        .get(ctx.url(&format!("/api/admin/products/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "Requires running server and database"]
async fn test_duplicate_category_conflicts() {
    let ctx = admin_context().await;
    let name = format!("Categorie {}", Uuid::new_v4().simple());

    let create = || {
        ctx.client
            .post(ctx.url("/api/admin/categories"))
            .json(&json!({"name": name}))
            .send()
    };
    assert_eq!(create().await.unwrap().status(), StatusCode::CREATED);
    assert_eq!(create().await.unwrap().status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore = "Requires running server and database"]
async fn test_resend_email_without_outbox_row() {
    let ctx = admin_context().await;
    let product_id = ctx.any_product_id().await;

    let order: Value = ctx
        .client
        .post(ctx.url("/api/orders"))
        .json(&json!({
            "name": "Vasile Rusu",
            "phone": "+37368000111",
            "email": "vasile@example.com",
            "address": "bd. Dacia 10",
            "city": "Chisinau",
            "items": [{"productId": product_id, "quantity": 1}],
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let order_id = i32::try_from(order["id"].as_i64().unwrap()).unwrap();

    // Nothing left to requeue, so the resend must enqueue a fresh message
    sqlx::query("DELETE FROM email_outbox WHERE order_id = $1")
        .bind(order_id)
        .execute(&ctx.pool)
        .await
        .unwrap();

    let resp = ctx
        .client
        .post(ctx.url(&format!("/api/admin/orders/{order_id}/resend-email")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let queued: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM email_outbox WHERE order_id = $1 AND kind = 'order_notification'",
    )
    .bind(order_id)
    .fetch_one(&ctx.pool)
    .await
    .unwrap();
    assert_eq!(queued, 1);
}
