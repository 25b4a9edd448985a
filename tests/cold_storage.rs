//! Cold storage workflow over HTTP with real timers.

mod common;

use common::TestServer;
use custody_engine::config::EngineConfig;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

fn short_waits() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.cold_storage.timer_poll_interval_ms = 50;
    config.cold_storage.withdrawal.waiting_period_secs = 1;
    config.cold_storage.withdrawal.required_approvers = 2;
    config.cold_storage.withdrawal.physical_verification_required = true;
    config.cold_storage.key_recovery.waiting_period_secs = 0;
    config.cold_storage.key_recovery.required_approvers = 2;
    config.cold_storage.key_recovery.physical_verification_required = false;
    config
}

fn withdrawal_request(wallet: Uuid) -> serde_json::Value {
    json!({
        "wallet_id": wallet,
        "request_type": "withdrawal",
        "amount": "500000000",
        "currency": "btc",
        "destination_address": "bc1qvault",
        "requested_by": "treasurer",
        "reason": "quarterly rebalance",
    })
}

#[tokio::test]
async fn test_cold_withdrawal_full_cycle() {
    let server = TestServer::start_with(short_waits()).await;
    let client = &server.client;
    let wallet = Uuid::new_v4();

    let request = client.create_cold_request(&withdrawal_request(wallet)).await.unwrap();
    assert_eq!(request.status, "waiting_period");
    assert_eq!(request.required_approvers, 2);
    assert!(request.physical_verification_required);

    let err = client.approve_cold(request.id, "bob", true).await.unwrap_err();
    assert_eq!(err.status(), Some(409));
    assert_eq!(err.kind(), Some("waiting_period_active"));

    tokio::time::sleep(Duration::from_millis(1300)).await;
    let ready = client.get_cold_request(request.id).await.unwrap();
    assert_eq!(ready.status, "ready_for_approval");

    let err = client.approve_cold(request.id, "bob", true).await.unwrap_err();
    assert_eq!(err.status(), Some(412));

    let verified = client.verify_cold(request.id, "auditor").await.unwrap();
    assert!(verified.physical_verification_completed);

    // signing request without shares online
    let err = client.approve_cold(request.id, "bob", true).await.unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert_eq!(err.kind(), Some("threshold_unavailable"));

    server.shares_online(wallet).await;
    let first = client.approve_cold(request.id, "bob", true).await.unwrap();
    assert_eq!(first.request.current_approvers, 1);
    assert_eq!(first.remaining_approvals, 1);

    let repeat = client.approve_cold(request.id, "bob", true).await.unwrap();
    assert!(repeat.duplicate);
    assert_eq!(repeat.request.current_approvers, 1);

    let second = client.approve_cold(request.id, "carol", true).await.unwrap();
    assert_eq!(second.request.status, "approved");
    assert_eq!(second.request.approver_ids, vec!["bob", "carol"]);

    let completed: serde_json::Value = reqwest::Client::new()
        .post(server.url(&format!("/api/v1/cold-storage/requests/{}/complete", request.id)))
        .json(&json!({ "tx_hash": "0xcold" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(completed["status"], "completed");
}

#[tokio::test]
async fn test_requester_cannot_approve_own_request() {
    let server = TestServer::start_with(short_waits()).await;
    let request = server
        .client
        .create_cold_request(&json!({
            "wallet_id": Uuid::new_v4(),
            "request_type": "key_recovery",
            "requested_by": "treasurer",
        }))
        .await
        .unwrap();
    assert_eq!(request.status, "ready_for_approval");

    let err = server.client.approve_cold(request.id, "treasurer", true).await.unwrap_err();
    assert_eq!(err.status(), Some(422));

    // key recovery does not sign, so no shares are needed
    let ok = server.client.approve_cold(request.id, "bob", false).await.unwrap();
    assert_eq!(ok.request.current_approvers, 1);
}

#[tokio::test]
async fn test_rejected_cold_request_is_final() {
    let server = TestServer::start_with(short_waits()).await;
    let wallet = Uuid::new_v4();
    let request = server.client.create_cold_request(&withdrawal_request(wallet)).await.unwrap();

    let res = reqwest::Client::new()
        .post(server.url(&format!("/api/v1/cold-storage/requests/{}/reject", request.id)))
        .json(&json!({ "approver_id": "bob", "reason": "destination unknown" }))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());

    tokio::time::sleep(Duration::from_millis(1300)).await;
    let after = server.client.get_cold_request(request.id).await.unwrap();
    assert_eq!(after.status, "rejected");

    let err = server.client.approve_cold(request.id, "carol", true).await.unwrap_err();
    assert_eq!(err.status(), Some(409));
}

#[tokio::test]
async fn test_cold_request_validation() {
    let server = TestServer::start_with(short_waits()).await;
    let err = server
        .client
        .create_cold_request(&json!({
            "wallet_id": Uuid::new_v4(),
            "request_type": "withdrawal",
            "currency": "BTC",
            "requested_by": "treasurer",
        }))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(400));
}
