//! HTTP client for the custody engine API.

mod client;
mod types;

pub use client::{CustodyClient, SdkError};
pub use types::*;
