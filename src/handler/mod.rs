//! Request handler module
//!
//! Routing dispatch, the forwarding handlers for tables and RPC, static
//! files and the demo endpoints.

pub mod demo;
pub mod proxy;
pub mod router;
pub mod static_files;

// Re-export main entry point
pub use router::handle_request;
