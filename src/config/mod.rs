// Configuration module entry point
// Layers defaults, an optional config file and environment variables

mod state;
mod types;

use std::net::SocketAddr;

// Re-export public types
pub use state::AppState;
pub use types::{
    Config, DemoConfig, HttpConfig, LoggingConfig, PerformanceConfig, RoutesConfig, ServerConfig,
    SupabaseConfig,
};

/// Environment variable naming an alternative config file
pub const CONFIG_PATH_ENV: &str = "GATEWAY_CONFIG";

/// Well-known environment names and the config keys they override
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("SUPABASE_URL", "supabase.url"),
    ("SUPABASE_KEY", "supabase.service_key"),
    ("SUPABASE_ANON_KEY", "supabase.anon_key"),
    ("SUPABASE_TABLE", "supabase.table"),
    ("SUPABASE_DEV_EMAIL", "supabase.dev_email"),
    ("SUPABASE_DEV_PASSWORD", "supabase.dev_password"),
    ("MESSAGE", "demo.message"),
];

impl Config {
    /// Load configuration from `GATEWAY_CONFIG` or "config" (any extension)
    pub fn load() -> Result<Self, config::ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config".to_string());
        Self::load_from(&path)
    }

    /// Load configuration from specified file path (without extension)
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        Self::load_with_env(config_path, |name| std::env::var(name).ok())
    }

    /// Load configuration with an explicit lookup for the well-known env names
    pub fn load_with_env(
        config_path: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("logging.show_headers", false)?
            .set_default("performance.keep_alive_timeout", 75)?
            .set_default("performance.read_timeout", 30)?
            .set_default("performance.write_timeout", 30)?
            .set_default("http.server_name", "supabase-gateway/0.1")?
            .set_default("http.enable_cors", true)?
            .set_default("http.max_body_size", 1_048_576)? // 1MB
            .set_default("routes.health_path", "/health")?
            .set_default("routes.static_mount", "/web")?
            .set_default("routes.static_dir", "static")?
            .set_default("routes.index_files", vec!["index.html", "index.htm"])?
            .set_default("routes.table_mount", "/mobile01")?
            .set_default("routes.resources", vec!["lists", "tasks", "tags", "reminders"])?
            .set_default("supabase.table", "mobile01")?
            .set_default("supabase.request_timeout_secs", 10)?;

        for (env_name, key) in ENV_OVERRIDES {
            builder = builder.set_override_option(*key, lookup(env_name))?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(vars: &[(&str, &str)]) -> Config {
        let vars: Vec<(String, String)> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::load_with_env("does-not-exist/config", move |name| {
            vars.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
        })
        .unwrap()
    }

    #[test]
    fn test_defaults_without_file() {
        let cfg = load(&[]);
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.routes.table_mount, "/mobile01");
        assert_eq!(cfg.routes.resources, vec!["lists", "tasks", "tags", "reminders"]);
        assert_eq!(cfg.supabase.table, "mobile01");
        assert_eq!(cfg.supabase.request_timeout_secs, 10);
        assert!(cfg.supabase.url.is_none());
        assert!(cfg.supabase.dev_credentials().is_none());
    }

    #[test]
    fn test_well_known_env_names() {
        let cfg = load(&[
            ("SUPABASE_URL", "https://demo.supabase.co"),
            ("SUPABASE_KEY", "service"),
            ("SUPABASE_TABLE", "todos"),
            ("SUPABASE_DEV_EMAIL", "dev@example.com"),
            ("SUPABASE_DEV_PASSWORD", "secret"),
            ("MESSAGE", "hello"),
        ]);
        assert_eq!(cfg.supabase.url.as_deref(), Some("https://demo.supabase.co"));
        assert_eq!(cfg.supabase.service_key.as_deref(), Some("service"));
        assert_eq!(cfg.supabase.table, "todos");
        assert_eq!(
            cfg.supabase.dev_credentials(),
            Some(("dev@example.com", "secret"))
        );
        assert_eq!(cfg.demo.message, "hello");
    }

    #[test]
    fn test_debug_redacts_keys() {
        let cfg = load(&[("SUPABASE_KEY", "super-secret-key")]);
        let dump = format!("{:?}", cfg.supabase);
        assert!(!dump.contains("super-secret-key"));
        assert!(dump.contains("<redacted>"));
    }
}
