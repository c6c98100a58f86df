//! Backing store module
//!
//! Outbound REST/RPC calls to the hosted Postgres API, credential selection
//! and the dev session token cache.

pub mod auth;
pub mod client;
pub mod error;
pub mod rpc;

pub use auth::{caller_token, normalize_bearer, Credential};
pub use client::{unwrap_single, SupabaseClient};
pub use error::{GatewayError, GatewayResult};
pub use rpc::call_with_fallback;
