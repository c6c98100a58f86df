//! Logger module
//!
//! Logging utilities for the gateway:
//! - Server lifecycle logging
//! - Upstream call and credential logging
//! - Access logging with multiple formats
//! - File-based logging support

mod format;
pub mod writer;

pub use format::AccessLogEntry;

use crate::config::Config;
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

/// Severity threshold, ordered from most to least verbose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl Level {
    /// Parse a config value; unknown names fall back to `Info`
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "trace" | "debug" => Self::Debug,
            "warn" | "warning" => Self::Warn,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Debug,
            2 => Self::Warn,
            3 => Self::Error,
            _ => Self::Info,
        }
    }
}

static LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);

fn enabled(level: Level) -> bool {
    level >= Level::from_u8(LEVEL.load(Ordering::Relaxed))
}

/// Initialize the logger with configuration
///
/// Should be called once at application startup.
pub fn init(config: &Config) -> std::io::Result<()> {
    LEVEL.store(Level::parse(&config.logging.level) as u8, Ordering::Relaxed);
    writer::init(
        config.logging.access_log_file.as_deref(),
        config.logging.error_log_file.as_deref(),
    )
}

fn write_info(message: &str) {
    match writer::get() {
        Some(w) => w.write_access(message),
        None => println!("{message}"),
    }
}

fn write_error(message: &str) {
    match writer::get() {
        Some(w) => w.write_error(message),
        None => eprintln!("{message}"),
    }
}

pub fn log_server_start(addr: &SocketAddr, config: &Config) {
    if !enabled(Level::Info) {
        return;
    }
    write_info("======================================");
    write_info("Supabase gateway started");
    write_info(&format!("Listening on: http://{addr}"));
    write_info(&format!("Log level: {}", config.logging.level));
    if let Some(workers) = config.server.workers {
        write_info(&format!("Worker threads: {workers}"));
    }
    match config.supabase.url.as_deref() {
        Some(url) => write_info(&format!("Backing store: {url}")),
        None => write_info("Backing store: <not configured>"),
    }
    if config.supabase.dev_credentials().is_some() {
        write_info("Dev session login: enabled");
    }
    write_info(&format!(
        "Table router: {} -> {}",
        config.routes.table_mount, config.supabase.table
    ));
    write_info(&format!(
        "Static files: {} -> {}",
        config.routes.static_mount, config.routes.static_dir
    ));
    if let Some(ref path) = config.logging.access_log_file {
        write_info(&format!("Access log: {path}"));
    }
    if let Some(ref path) = config.logging.error_log_file {
        write_info(&format!("Error log: {path}"));
    }
    write_info("======================================\n");
}

pub fn log_connection_accepted(peer_addr: &SocketAddr) {
    if enabled(Level::Debug) {
        write_info(&format!("[Connection] Accepted from: {peer_addr}"));
    }
}

pub fn log_connection_error(err: &impl std::fmt::Debug) {
    if enabled(Level::Error) {
        write_error(&format!("[ERROR] Failed to serve connection: {err:?}"));
    }
}

pub fn log_error(message: &str) {
    if enabled(Level::Error) {
        write_error(&format!("[ERROR] {message}"));
    }
}

pub fn log_warning(message: &str) {
    if enabled(Level::Warn) {
        write_error(&format!("[WARN] {message}"));
    }
}

pub fn log_info(message: &str) {
    if enabled(Level::Info) {
        write_info(&format!("[INFO] {message}"));
    }
}

pub fn log_headers_count(count: usize, show: bool) {
    if show && enabled(Level::Debug) {
        write_info(&format!("[Headers] Count: {count}"));
    }
}

/// One outbound call to the backing store
pub fn log_upstream(method: &str, path: &str, status: u16, elapsed: Duration, credential: &str) {
    if status >= 500 {
        log_warning(&format!(
            "[UPSTREAM] {method} {path} -> {status} ({}ms, {credential})",
            elapsed.as_millis()
        ));
    } else if enabled(Level::Debug) {
        write_info(&format!(
            "[UPSTREAM] {method} {path} -> {status} ({}ms, {credential})",
            elapsed.as_millis()
        ));
    }
}

pub fn log_token_refreshed(expires_at: &DateTime<Utc>) {
    if enabled(Level::Info) {
        write_info(&format!(
            "[AUTH] Dev session token refreshed, valid until {}",
            expires_at.to_rfc3339()
        ));
    }
}

pub fn log_rpc_fallback(function: &str, from: &[String], to: &[String]) {
    if enabled(Level::Info) {
        write_info(&format!(
            "[RPC] {function}: function not found, retrying with [{}] instead of [{}]",
            to.join(", "),
            from.join(", ")
        ));
    }
}

/// Log formatted access log entry
pub fn log_access(entry: &AccessLogEntry, format: &str) {
    match writer::get() {
        Some(w) => w.write_access(&entry.format(format)),
        None => println!("{}", entry.format(format)),
    }
}

pub fn log_shutdown(active_connections: usize) {
    write_info(&format!(
        "[Shutdown] Stopped accepting connections, {active_connections} still active"
    ));
}
