// Configuration types module
// Defines all configuration-related data structures

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    pub http: HttpConfig,
    pub routes: RoutesConfig,
    pub supabase: SupabaseConfig,
    #[serde(default)]
    pub demo: DemoConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
    pub show_headers: bool,
    /// Access log format (combined, common, json, or custom pattern)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
    /// Access log file path (optional, stdout if not set)
    #[serde(default)]
    pub access_log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default)]
    pub error_log_file: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "combined".to_string()
}

/// Performance configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    pub keep_alive_timeout: u64,
    pub read_timeout: u64,
    pub write_timeout: u64,
    pub max_connections: Option<u64>,
}

/// HTTP configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    pub server_name: String,
    pub enable_cors: bool,
    pub max_body_size: u64,
}

/// Routes configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RoutesConfig {
    /// Health endpoint path
    pub health_path: String,
    /// URL prefix the static directory is mounted on
    pub static_mount: String,
    /// Directory served under `static_mount`
    pub static_dir: String,
    pub index_files: Vec<String>,
    /// Mount point of the default-table CRUD router
    pub table_mount: String,
    /// Resource names exposed under `/api/{resource}`
    pub resources: Vec<String>,
}

/// Backing store connection settings
#[derive(Deserialize, Clone, Default)]
pub struct SupabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
    /// Service-role key, sent only when no caller or dev credentials apply
    #[serde(default)]
    pub service_key: Option<String>,
    #[serde(default)]
    pub anon_key: Option<String>,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default)]
    pub dev_email: Option<String>,
    #[serde(default)]
    pub dev_password: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[allow(clippy::missing_const_for_fn)]
fn default_table() -> String {
    "mobile01".to_string()
}

const fn default_request_timeout() -> u64 {
    10
}

impl SupabaseConfig {
    /// Both dev email and password are set and non-empty
    pub fn dev_credentials(&self) -> Option<(&str, &str)> {
        match (self.dev_email.as_deref(), self.dev_password.as_deref()) {
            (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
                Some((email, password))
            }
            _ => None,
        }
    }
}

// Keys stay out of Debug output so config dumps never leak them.
impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("service_key", &self.service_key.as_ref().map(|_| "<redacted>"))
            .field("anon_key", &self.anon_key.as_ref().map(|_| "<redacted>"))
            .field("table", &self.table)
            .field("dev_email", &self.dev_email)
            .field("dev_password", &self.dev_password.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Demo endpoint settings
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct DemoConfig {
    /// Value reported by `/env` (the `MESSAGE` environment variable)
    #[serde(default)]
    pub message: String,
}
