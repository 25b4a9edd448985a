//! Change notification stream over WebSocket.

mod common;

use common::TestServer;
use custody_sdk::TransactionRequest;
use futures_util::StreamExt;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;

#[tokio::test]
async fn test_status_changes_are_streamed() {
    let server = TestServer::start().await;
    let wallet = server.wallet(json!({ "min_approvers": 1 })).await;

    let (mut socket, _) = connect_async(server.client.events_url()).await.unwrap();
    // the subscription is live once the handler has registered it
    for _ in 0..50 {
        if server.engine.events().subscriber_count() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let tx = server
        .client
        .submit_transaction(
            &TransactionRequest::withdrawal(wallet, 10, "BTC")
                .to("bc1qdestination")
                .initiated_by("alice"),
        )
        .await
        .unwrap();
    server.client.approve(tx.id, "bob", true).await.unwrap();

    let mut seen = Vec::new();
    let collect = async {
        while let Some(frame) = socket.next().await {
            let frame = frame.unwrap();
            if !frame.is_text() {
                continue;
            }
            let event: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
            if event["type"] == "transaction_status_changed" {
                seen.push(event["to"].as_str().unwrap_or_default().to_string());
                if seen.last().map(String::as_str) == Some("processing") {
                    break;
                }
            }
        }
    };
    timeout(Duration::from_secs(5), collect).await.unwrap();

    assert_eq!(seen, vec!["pending", "processing"]);
}
