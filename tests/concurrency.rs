//! Races over the HTTP surface: quorum and daily limits must hold under load.

mod common;

use common::TestServer;
use custody_sdk::TransactionRequest;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Barrier;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_approvals_cross_quorum_once() {
    let server = TestServer::start().await;
    let wallet = server.wallet(json!({ "min_approvers": 3 })).await;
    let tx = server
        .client
        .submit_transaction(
            &TransactionRequest::withdrawal(wallet, 1_000, "ETH")
                .to("0xdestination")
                .initiated_by("alice"),
        )
        .await
        .unwrap();
    let tx_id = tx.id;

    let approvers = 12;
    let barrier = Arc::new(Barrier::new(approvers));
    let mut handles = Vec::new();
    for i in 0..approvers {
        let client = server.client.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            client.approve(tx_id, &format!("approver-{}", i), true).await
        }));
    }

    let mut crossings = 0;
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        if result.quorum_reached {
            crossings += 1;
        }
        assert!(result.transaction.current_approvals <= 3);
    }
    println!("approvers={} quorum_crossings={}", approvers, crossings);
    assert_eq!(crossings, 1);

    let tx = server.client.get_transaction(tx_id).await.unwrap();
    assert_eq!(tx.status, "processing");
    assert_eq!(tx.current_approvals, 3);
    assert_eq!(server.client.approvals(tx_id).await.unwrap().len(), approvers);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_respect_daily_limit() {
    let server = TestServer::start().await;
    let wallet = server.wallet(json!({ "daily_limit": "1000" })).await;

    let submitters = 25;
    let barrier = Arc::new(Barrier::new(submitters));
    let mut handles = Vec::new();
    for _ in 0..submitters {
        let client = server.client.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            client
                .submit_transaction(&TransactionRequest::withdrawal(wallet, 100, "ETH").to("0xdestination"))
                .await
        }));
    }

    let mut admitted = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(err) => {
                assert_eq!(err.kind(), Some("policy_violation"));
                refused += 1;
            }
        }
    }
    println!("admitted={} refused={}", admitted, refused);
    assert_eq!(admitted, 10);
    assert_eq!(refused, submitters - 10);

    let wallet_str = wallet.to_string();
    let page = server
        .client
        .list_transactions(&[("wallet_id", wallet_str.as_str())])
        .await
        .unwrap();
    assert_eq!(page.total, 10);
}
