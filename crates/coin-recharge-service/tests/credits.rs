//! Credit balance, usage and admin integration tests.

mod common;

use axum::http::StatusCode;
use coin_recharge_core::UserId;
use common::{bearer_for, TestHarness, ADMIN_API_KEY, SERVICE_API_KEY};
use serde_json::json;

async fn grant(harness: &TestHarness, category: &str, amount: i64) -> serde_json::Value {
    let response = harness
        .server
        .post("/v1/admin/credits")
        .add_header("x-admin-key", ADMIN_API_KEY)
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "category": category,
            "amount": amount,
            "reason": "welcome bonus",
        }))
        .await;
    response.assert_status_ok();
    response.json()
}

async fn spend(harness: &TestHarness, body: serde_json::Value) -> axum_test::TestResponse {
    harness
        .server
        .post("/v1/credits/usage")
        .add_header("x-api-key", SERVICE_API_KEY)
        .add_header("x-service-name", "job-board")
        .json(&body)
        .await
}

// ============================================================================
// Balance
// ============================================================================

#[tokio::test]
async fn get_balance_success() {
    let harness = TestHarness::new();
    harness.create_account("candidate").await;

    assert_eq!(harness.balance().await, 0);
}

#[tokio::test]
async fn get_balance_without_account_fails() {
    let harness = TestHarness::new();

    harness
        .server
        .get("/v1/credits/balance")
        .add_header("authorization", harness.user_auth_header())
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn get_balance_without_auth_fails() {
    let harness = TestHarness::new();

    harness
        .server
        .get("/v1/credits/balance")
        .await
        .assert_status_unauthorized();
}

// ============================================================================
// Usage
// ============================================================================

#[tokio::test]
async fn usage_debits_balance() {
    let harness = TestHarness::new();
    harness.create_account("employer").await;
    grant(&harness, "bonus", 100).await;

    let response = spend(
        &harness,
        json!({
            "user_id": harness.test_user_id.to_string(),
            "category": "cv_unlock",
            "amount": 30,
            "description": "Unlocked CV",
            "reference_id": "cv_123",
            "reference_type": "cv",
        }),
    )
    .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["amount"], -30);
    assert_eq!(body["balance_after"], 70);
    assert_eq!(body["transaction_type"], "usage");

    assert_eq!(harness.balance().await, 70);
}

#[tokio::test]
async fn usage_retry_with_same_reference_is_idempotent() {
    let harness = TestHarness::new();
    harness.create_account("employer").await;
    grant(&harness, "bonus", 100).await;

    let body = json!({
        "user_id": harness.test_user_id.to_string(),
        "category": "job_post",
        "amount": 40,
        "description": "Published job",
        "reference_id": "job_9",
        "reference_type": "job",
    });
    let first: serde_json::Value = spend(&harness, body.clone()).await.json();
    let second: serde_json::Value = spend(&harness, body).await.json();

    assert_eq!(first["id"], second["id"]);
    assert_eq!(harness.balance().await, 60);
}

#[tokio::test]
async fn usage_references_are_scoped_per_user() {
    let harness = TestHarness::new();
    harness.create_account("candidate").await;
    grant(&harness, "bonus", 100).await;

    let other = UserId::generate();
    harness
        .server
        .post("/v1/accounts")
        .add_header("authorization", bearer_for(&other))
        .json(&json!({ "role": "candidate" }))
        .await
        .assert_status_ok();
    harness
        .server
        .post("/v1/admin/credits")
        .add_header("x-admin-key", ADMIN_API_KEY)
        .json(&json!({
            "user_id": other.to_string(),
            "category": "bonus",
            "amount": 100,
            "reason": "welcome bonus",
        }))
        .await
        .assert_status_ok();

    let view = |user_id: UserId| {
        json!({
            "user_id": user_id.to_string(),
            "category": "job_view",
            "amount": 10,
            "description": "Viewed premium job",
            "reference_id": "job-42",
            "reference_type": "job",
        })
    };
    let first: serde_json::Value = spend(&harness, view(harness.test_user_id)).await.json();
    let response = spend(&harness, view(other)).await;
    response.assert_status_ok();
    let second: serde_json::Value = response.json();

    assert_ne!(first["id"], second["id"]);
    assert_eq!(second["user_id"], other.to_string());
    assert_eq!(second["balance_after"], 90);
    assert_eq!(harness.balance().await, 90);

    let response = harness
        .server
        .get("/v1/credits/balance")
        .add_header("authorization", bearer_for(&other))
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["coin_balance"], 90);
}

#[tokio::test]
async fn usage_insufficient_credits() {
    let harness = TestHarness::new();
    harness.create_account("candidate").await;
    grant(&harness, "bonus", 10).await;

    let response = spend(
        &harness,
        json!({
            "user_id": harness.test_user_id.to_string(),
            "category": "job_view",
            "amount": 11,
            "description": "Viewed premium job",
        }),
    )
    .await;

    response.assert_status(StatusCode::PAYMENT_REQUIRED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "insufficient_credits");
    assert_eq!(body["error"]["details"]["balance"], 10);
    assert_eq!(body["error"]["details"]["required"], 11);
    assert_eq!(harness.balance().await, 10);
}

#[tokio::test]
async fn usage_rejects_deposit_categories_and_bad_amounts() {
    let harness = TestHarness::new();
    harness.create_account("candidate").await;

    for (category, amount) in [("bonus", 5), ("recharge", 5), ("job_view", 0), ("job_view", -3)] {
        let response = spend(
            &harness,
            json!({
                "user_id": harness.test_user_id.to_string(),
                "category": category,
                "amount": amount,
                "description": "x",
            }),
        )
        .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn usage_requires_service_key() {
    let harness = TestHarness::new();
    harness.create_account("candidate").await;

    harness
        .server
        .post("/v1/credits/usage")
        .add_header("x-api-key", "wrong")
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "category": "job_view",
            "amount": 1,
            "description": "x",
        }))
        .await
        .assert_status_unauthorized();
}

// ============================================================================
// History and summary
// ============================================================================

#[tokio::test]
async fn history_filters_and_paginates() {
    let harness = TestHarness::new();
    harness.create_account("employer").await;
    grant(&harness, "bonus", 100).await;
    for i in 0..3 {
        spend(
            &harness,
            json!({
                "user_id": harness.test_user_id.to_string(),
                "category": "job_boost",
                "amount": 10,
                "description": format!("Boost {i}"),
            }),
        )
        .await
        .assert_status_ok();
    }

    let response = harness
        .server
        .get("/v1/credits/transactions?type=usage&limit=2&page=1")
        .add_header("authorization", harness.user_auth_header())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["description"], "Boost 2");
    assert_eq!(body["pagination"]["total"], 3);
    assert_eq!(body["pagination"]["total_pages"], 2);

    let response = harness
        .server
        .get("/v1/credits/transactions?category=bonus")
        .add_header("authorization", harness.user_auth_header())
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["entries"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn summary_totals_by_category() {
    let harness = TestHarness::new();
    harness.create_account("employer").await;
    grant(&harness, "bonus", 100).await;
    grant(&harness, "refund", 20).await;
    spend(
        &harness,
        json!({
            "user_id": harness.test_user_id.to_string(),
            "category": "cv_unlock",
            "amount": 45,
            "description": "Unlocked CV",
        }),
    )
    .await
    .assert_status_ok();

    let response = harness
        .server
        .get("/v1/credits/summary")
        .add_header("authorization", harness.user_auth_header())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["current_balance"], 75);
    assert_eq!(body["total_deposits"], 120);
    assert_eq!(body["total_usage"], 45);
    assert_eq!(body["by_category"]["bonus"]["total"], 100);
    assert_eq!(body["by_category"]["cv_unlock"]["count"], 1);
}

// ============================================================================
// Admin
// ============================================================================

#[tokio::test]
async fn admin_grant_requires_admin_key() {
    let harness = TestHarness::new();
    harness.create_account("candidate").await;

    harness
        .server
        .post("/v1/admin/credits")
        .add_header("x-admin-key", "nope")
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "category": "bonus",
            "amount": 10,
            "reason": "x",
        }))
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn admin_cannot_grant_usage_categories() {
    let harness = TestHarness::new();
    harness.create_account("candidate").await;

    harness
        .server
        .post("/v1/admin/credits")
        .add_header("x-admin-key", ADMIN_API_KEY)
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "category": "recharge",
            "amount": 10,
            "reason": "x",
        }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_grants_keep_their_reference_type() {
    let harness = TestHarness::new();
    harness.create_account("candidate").await;

    let grant_for = |category: &str, reference_type: &str| {
        json!({
            "user_id": harness.test_user_id.to_string(),
            "category": category,
            "amount": 15,
            "reason": "compensation",
            "reference_id": "42",
            "reference_type": reference_type,
        })
    };
    let mut ids = Vec::new();
    for body in [
        grant_for("bonus", "job"),
        grant_for("refund", "application"),
        grant_for("bonus", "job"),
    ] {
        let response = harness
            .server
            .post("/v1/admin/credits")
            .add_header("x-admin-key", ADMIN_API_KEY)
            .json(&body)
            .await;
        response.assert_status_ok();
        let entry: serde_json::Value = response.json();
        ids.push(entry["id"].clone());
    }

    assert_ne!(ids[0], ids[1]);
    assert_eq!(ids[0], ids[2]);
    assert_eq!(harness.balance().await, 30);

    harness
        .server
        .post("/v1/admin/credits")
        .add_header("x-admin-key", ADMIN_API_KEY)
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "category": "bonus",
            "amount": 15,
            "reason": "compensation",
            "reference_id": "42",
        }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_ledger_verification() {
    let harness = TestHarness::new();
    harness.create_account("candidate").await;
    let entry = grant(&harness, "bonus", 50).await;
    assert_eq!(entry["balance_after"], 50);

    let response = harness
        .server
        .get(&format!("/v1/admin/ledger/{}/verify", harness.test_user_id))
        .add_header("x-admin-key", ADMIN_API_KEY)
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["entries"], 1);
    assert_eq!(body["replayed_balance"], 50);
    assert_eq!(body["account_balance"], 50);
    assert!(body["first_mismatch"].is_null());
}
