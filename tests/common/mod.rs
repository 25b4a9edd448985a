//! Shared harness: a real engine behind the real HTTP server on an ephemeral port.

#![allow(dead_code)]

use custody_engine::config::EngineConfig;
use custody_engine::lifecycle::Shutdown;
use custody_engine::{CustodyEngine, HttpServer};
use custody_sdk::CustodyClient;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

pub const ADMIN_KEY: &str = "integration-admin-key";

pub struct TestServer {
    pub addr: SocketAddr,
    pub client: CustodyClient,
    pub engine: Arc<CustodyEngine>,
    shutdown: Shutdown,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(EngineConfig::default()).await
    }

    pub async fn start_with(mut config: EngineConfig) -> Self {
        config.admin.api_key = ADMIN_KEY.to_string();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let engine = Arc::new(CustodyEngine::new(config.clone()));
        let shutdown = Shutdown::new();
        engine.spawn_background(&shutdown).await;

        let server = HttpServer::new(engine.clone(), &config);
        let server_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            let _ = server.run(listener, server_shutdown).await;
        });

        Self {
            addr,
            client: CustodyClient::new(&format!("http://{}", addr)),
            engine,
            shutdown,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Report a 2-of-3 share set with every share online.
    pub async fn shares_online(&self, wallet_id: Uuid) {
        for index in 0..3 {
            self.client
                .report_share(&json!({
                    "wallet_id": wallet_id,
                    "share_index": index,
                    "threshold": 2,
                    "total_shares": 3,
                    "online": true,
                }))
                .await
                .unwrap();
        }
    }

    /// Fresh wallet with `rules` as its policy and signing available.
    pub async fn wallet(&self, rules: serde_json::Value) -> Uuid {
        let wallet_id = Uuid::new_v4();
        self.client.set_wallet_policy(wallet_id, &rules).await.unwrap();
        self.shares_online(wallet_id).await;
        wallet_id
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}
