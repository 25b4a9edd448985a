//! HTTP API subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (router, tower layers: request id, trace, timeout, body limit)
//!     → middleware.rs (per-route latency metrics)
//!     → handlers/* (decode, call the engine, encode)
//!     → response.rs (EngineError → status + JSON body)
//!
//! GET /api/v1/events
//!     → websocket.rs (engine event stream as JSON text frames)
//! ```

pub mod handlers;
pub mod middleware;
pub mod response;
pub mod server;
pub mod tls;
pub mod websocket;

pub use response::{ApiError, ApiResult};
pub use server::{AppState, HttpServer};
