//! End-to-end transaction approval over HTTP.

mod common;

use common::{TestServer, ADMIN_KEY};
use custody_sdk::TransactionRequest;
use serde_json::json;
use uuid::Uuid;

fn withdrawal(wallet: Uuid, amount: u64) -> TransactionRequest {
    TransactionRequest::withdrawal(wallet, amount, "BTC")
        .to("bc1qdestination")
        .initiated_by("alice")
}

#[tokio::test]
async fn test_two_of_n_approval_reaches_processing() {
    let server = TestServer::start().await;
    let wallet = server.wallet(json!({ "min_approvers": 2 })).await;
    let client = &server.client;

    let tx = client.submit_transaction(&withdrawal(wallet, 1_000_000_000)).await.unwrap();
    assert_eq!(tx.status, "pending");
    assert_eq!(tx.requires_approvals, 2);
    assert_eq!(tx.amount, "1000000000");

    let first = client.approve(tx.id, "bob", true).await.unwrap();
    assert_eq!(first.transaction.status, "pending");
    assert_eq!(first.transaction.current_approvals, 1);
    assert_eq!(first.remaining_approvals, 1);

    let second = client.approve(tx.id, "carol", true).await.unwrap();
    assert!(second.quorum_reached);
    assert_eq!(second.transaction.status, "processing");

    let late = client.approve(tx.id, "dave", true).await.unwrap();
    assert!(!late.quorum_reached);
    assert_eq!(late.transaction.current_approvals, 2);

    let votes = client.approvals(tx.id).await.unwrap();
    assert_eq!(votes.len(), 3);

    let done = client.complete(tx.id, Some(21_000), Some("0xabc")).await.unwrap();
    assert_eq!(done.status, "completed");
    assert_eq!(done.tx_hash.as_deref(), Some("0xabc"));
}

#[tokio::test]
async fn test_policy_violation_maps_to_422() {
    let server = TestServer::start().await;
    let wallet = server
        .wallet(json!({ "per_tx_limit": "1000", "address_whitelist": ["bc1qallowed"] }))
        .await;

    let err = server
        .client
        .submit_transaction(&TransactionRequest::withdrawal(wallet, 5000, "BTC").to("bc1qallowed"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(422));
    assert_eq!(err.kind(), Some("policy_violation"));

    let err = server
        .client
        .submit_transaction(&TransactionRequest::withdrawal(wallet, 10, "BTC").to("bc1qelsewhere"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(422));

    let ok = server
        .client
        .submit_transaction(&TransactionRequest::withdrawal(wallet, 10, "BTC").to("BC1QALLOWED"))
        .await
        .unwrap();
    assert_eq!(ok.status, "pending");
}

#[tokio::test]
async fn test_rejection_is_final_over_http() {
    let server = TestServer::start().await;
    let wallet = server.wallet(json!({ "min_approvers": 2 })).await;
    let client = &server.client;
    let tx = client.submit_transaction(&withdrawal(wallet, 10)).await.unwrap();

    let rejected = client.reject(tx.id, "bob", "destination not verified").await.unwrap();
    assert_eq!(rejected.status, "rejected");
    assert_eq!(rejected.rejection_reason.as_deref(), Some("destination not verified"));

    let err = client.approve(tx.id, "carol", true).await.unwrap_err();
    assert_eq!(err.status(), Some(409));
    assert_eq!(err.kind(), Some("invalid_state_transition"));

    let err = client.reject(tx.id, "carol", "").await.unwrap_err();
    assert_eq!(err.status(), Some(400));
}

#[tokio::test]
async fn test_self_approval_refused() {
    let server = TestServer::start().await;
    let wallet = server.wallet(json!({ "min_approvers": 1 })).await;
    let tx = server.client.submit_transaction(&withdrawal(wallet, 10)).await.unwrap();

    let err = server.client.approve(tx.id, "alice", true).await.unwrap_err();
    assert_eq!(err.status(), Some(422));
}

#[tokio::test]
async fn test_failed_transaction_can_be_retried() {
    let server = TestServer::start().await;
    let wallet = server.wallet(json!({ "min_approvers": 1 })).await;
    let client = &server.client;
    let tx = client.submit_transaction(&withdrawal(wallet, 10)).await.unwrap();
    client.approve(tx.id, "bob", true).await.unwrap();

    let failed = client.fail(tx.id, "nonce too low").await.unwrap();
    assert_eq!(failed.status, "failed");
    assert_eq!(failed.error_message.as_deref(), Some("nonce too low"));

    let retried = client.retry(tx.id).await.unwrap();
    assert_eq!(retried.status, "pending");
    assert_eq!(retried.attempt, 2);
    assert_eq!(retried.current_approvals, 0);

    let again = client.approve(tx.id, "bob", true).await.unwrap();
    assert!(!again.duplicate);
    assert_eq!(again.transaction.status, "processing");
}

#[tokio::test]
async fn test_unknown_transaction_is_404() {
    let server = TestServer::start().await;
    let err = server.client.get_transaction(Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.kind(), Some("not_found"));
}

#[tokio::test]
async fn test_malformed_body_is_400() {
    let server = TestServer::start().await;
    let res = reqwest::Client::new()
        .post(server.url("/api/v1/transactions"))
        .header("content-type", "application/json")
        .body("{\"wallet_id\": 42}")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 400);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation");
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn test_list_filters_and_pages() {
    let server = TestServer::start().await;
    let wallet = server.wallet(json!({ "min_approvers": 1 })).await;
    let client = &server.client;
    for _ in 0..3 {
        client.submit_transaction(&withdrawal(wallet, 10)).await.unwrap();
    }
    let other = server.wallet(json!({})).await;
    client.submit_transaction(&withdrawal(other, 10)).await.unwrap();

    let wallet_str = wallet.to_string();
    let page = client
        .list_transactions(&[("wallet_id", wallet_str.as_str()), ("limit", "2")])
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.limit, 2);

    let pending = client.list_transactions(&[("status", "pending")]).await.unwrap();
    assert_eq!(pending.total, 4);
}

#[tokio::test]
async fn test_batch_partial_over_http() {
    let server = TestServer::start().await;
    let wallet = server.wallet(json!({ "min_approvers": 1 })).await;
    let client = &server.client;

    let batch = client
        .create_batch(
            "settlement",
            &[withdrawal(wallet, 10), withdrawal(wallet, 20), withdrawal(wallet, 30)],
        )
        .await
        .unwrap();
    assert_eq!(batch.status, "pending");
    assert_eq!(batch.total_count, 3);

    client.approve_batch(batch.id, "bob", true).await.unwrap();
    let ids = &batch.transaction_ids;
    client.complete(ids[0], None, Some("0x01")).await.unwrap();
    client.complete(ids[1], None, Some("0x02")).await.unwrap();
    client.fail(ids[2], "reverted").await.unwrap();

    let batch = client.get_batch(batch.id).await.unwrap();
    assert_eq!(batch.status, "partial");
    assert_eq!(batch.completed_count, 2);
    assert_eq!(batch.failed_count, 1);
    assert!(batch.completed_count + batch.failed_count <= batch.total_count);
}

#[tokio::test]
async fn test_internal_transfer_requires_relationship() {
    let server = TestServer::start().await;
    let parent = server.wallet(json!({ "min_approvers": 1 })).await;
    let child = server.wallet(json!({ "min_approvers": 1 })).await;
    let client = &server.client;

    let err = client.create_transfer(parent, child, 100, "ETH").await.unwrap_err();
    assert_eq!(err.status(), Some(422));

    client.create_relationship(parent, child).await.unwrap();
    let transfer = client.create_transfer(parent, child, 100, "ETH").await.unwrap();
    assert_eq!(transfer["status"], "pending");

    let err = client.create_relationship(child, parent).await.unwrap_err();
    assert_eq!(err.status(), Some(409));
}

#[tokio::test]
async fn test_admin_requires_bearer_key() {
    let server = TestServer::start().await;

    let res = reqwest::Client::new()
        .get(server.url("/admin/stats"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 401);

    let wallet = server.wallet(json!({})).await;
    server.client.submit_transaction(&withdrawal(wallet, 10)).await.unwrap();
    let stats = server.client.admin_stats(ADMIN_KEY).await.unwrap();
    assert_eq!(stats["transactions"]["total"], 1);

    let health = server.client.health().await.unwrap();
    assert_eq!(health["status"], "ok");
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let server = TestServer::start().await;
    let res = reqwest::Client::new()
        .get(server.url("/health"))
        .header("x-request-id", "trace-123")
        .send()
        .await
        .unwrap();
    assert_eq!(
        res.headers().get("x-request-id").and_then(|v| v.to_str().ok()),
        Some("trace-123")
    );

    let generated = reqwest::Client::new().get(server.url("/health")).send().await.unwrap();
    assert!(generated.headers().contains_key("x-request-id"));
}
