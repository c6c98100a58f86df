//! HTTP gateway in front of a hosted Postgres REST backend.
//!
//! Table CRUD and RPC calls are forwarded with the right credentials
//! (caller token, cached dev session or service role). Static files and a
//! few demo endpoints are served alongside.

pub mod config;
pub mod handler;
pub mod http;
pub mod logger;
pub mod server;
pub mod supabase;
