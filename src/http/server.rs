//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the `/api/v1` router over a shared [`CustodyEngine`]
//! - Mount the admin API behind bearer authentication
//! - Wire up middleware (request id, tracing, timeout, body limit, metrics)
//! - Serve plain TCP or TLS until the shutdown signal

use axum::routing::{get, post, put};
use axum::{middleware, Router};
use axum_server::tls_rustls::RustlsConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::admin;
use crate::config::EngineConfig;
use crate::engine::CustodyEngine;
use crate::http::handlers::{batches, cold_storage, health, mpc, policies, pools, transactions};
use crate::http::middleware::track_metrics;
use crate::http::websocket;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CustodyEngine>,
    pub admin_key: Arc<str>,
}

pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(engine: Arc<CustodyEngine>, config: &EngineConfig) -> Self {
        let state = AppState {
            engine,
            admin_key: Arc::from(config.admin.api_key.as_str()),
        };
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Finished router, for tests that drive it without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    #[allow(deprecated)]
    fn build_router(config: &EngineConfig, state: AppState) -> Router {
        let api = Router::new()
            .route("/transactions", post(transactions::submit).get(transactions::list))
            .route("/transactions/{id}", get(transactions::get))
            .route("/transactions/{id}/approvals", get(transactions::approvals))
            .route("/transactions/{id}/approve", post(transactions::approve))
            .route("/transactions/{id}/reject", post(transactions::reject))
            .route("/transactions/{id}/cancel", post(transactions::cancel))
            .route("/transactions/{id}/retry", post(transactions::retry))
            .route("/transactions/{id}/broadcast", post(transactions::broadcast))
            .route("/transactions/{id}/complete", post(transactions::complete))
            .route("/transactions/{id}/fail", post(transactions::fail))
            .route("/wallets/{id}/policy", get(policies::get_wallet_policy).put(policies::put_wallet_policy))
            .route("/batches", post(batches::create).get(batches::list))
            .route("/batches/{id}", get(batches::get))
            .route("/batches/{id}/approve", post(batches::approve))
            .route("/batches/{id}/cancel", post(batches::cancel))
            .route("/cold-storage/requests", post(cold_storage::create).get(cold_storage::list))
            .route("/cold-storage/requests/{id}", get(cold_storage::get))
            .route("/cold-storage/requests/{id}/approvals", get(cold_storage::approvals))
            .route("/cold-storage/requests/{id}/approve", post(cold_storage::approve))
            .route("/cold-storage/requests/{id}/reject", post(cold_storage::reject))
            .route("/cold-storage/requests/{id}/verify", post(cold_storage::verify))
            .route("/cold-storage/requests/{id}/complete", post(cold_storage::complete))
            .route("/pools/relationships", post(pools::create_relationship).get(pools::list_relationships))
            .route("/pools/relationships/{id}", get(pools::get_relationship))
            .route("/pools/relationships/{id}/status", post(pools::update_status))
            .route("/pools/{parent_id}/hierarchy", get(pools::hierarchy))
            .route("/pools/policies", post(pools::create_policy).get(pools::list_policies))
            .route("/pools/transfers", post(pools::create_transfer).get(pools::list_transfers))
            .route("/pools/transfers/{id}", get(pools::get_transfer))
            .route("/mpc/shares", put(mpc::report_share))
            .route("/mpc/wallets/{id}/threshold", get(mpc::threshold))
            .route("/events", get(websocket::events));

        let mut router = Router::new()
            .nest("/api/v1", api)
            .route("/health", get(health::health));
        if config.admin.enabled {
            router = router.merge(admin::router(state.clone()));
        } else {
            tracing::info!("Admin API disabled");
        }

        router
            .route_layer(middleware::from_fn(track_metrics))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs))),
            )
    }

    /// Serve on an already bound listener until shutdown.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve HTTPS until shutdown; in-flight requests get `drain` to finish.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        mut shutdown: broadcast::Receiver<()>,
        drain: Duration,
    ) -> Result<(), std::io::Error> {
        let handle = axum_server::Handle::new();
        let trigger = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            trigger.graceful_shutdown(Some(drain));
        });

        tracing::info!(address = %addr, "HTTPS server starting");
        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}
