// Application state module
// Shared by every connection task

use super::types::Config;
use crate::supabase::{GatewayResult, SupabaseClient};

/// Application state
pub struct AppState {
    pub config: Config,
    /// Pooled outbound client, owns the dev token cache
    pub supabase: SupabaseClient,
}

impl AppState {
    pub fn new(config: &Config) -> GatewayResult<Self> {
        Ok(Self {
            config: config.clone(),
            supabase: SupabaseClient::new(&config.supabase)?,
        })
    }
}
