//! Gateway error type
//!
//! Every failure on the forwarding path ends up here and is turned into an
//! HTTP response by `http::response::build_error_response`.

use serde_json::{json, Value};
use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Required backing-store settings are missing
    #[error("{0} not configured")]
    NotConfigured(&'static str),

    /// The backing store answered with a status >= 400
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    /// The backing store could not be reached
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Password login for the dev session was rejected
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Caller sent something we cannot forward
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("{0}")]
    NotFound(String),

    /// Upstream answered 2xx with a body that is not JSON
    #[error("invalid upstream response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// HTTP status returned to the caller
    pub const fn status(&self) -> u16 {
        match self {
            Self::NotConfigured(_) | Self::Upstream { .. } | Self::Transport(_) | Self::Decode(_) => {
                500
            }
            Self::AuthFailed(_) => 502,
            Self::InvalidPayload(_) => 400,
            Self::NotFound(_) => 404,
        }
    }

    /// `detail` value of the JSON error body
    pub fn detail(&self) -> Value {
        match self {
            Self::Upstream { body, .. } => json!({ "supabase_error": body }),
            Self::Transport(e) => json!({ "supabase_error": e.to_string() }),
            Self::Decode(msg) => json!({ "supabase_error": msg }),
            Self::AuthFailed(msg) => json!({ "auth_error": msg }),
            Self::InvalidPayload(msg) | Self::NotFound(msg) => Value::String(msg.clone()),
            Self::NotConfigured(_) => Value::String(self.to_string()),
        }
    }
}
