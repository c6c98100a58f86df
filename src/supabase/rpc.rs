//! RPC passthrough with the parameter-name fallback
//!
//! Backing functions are often declared with `p_`-prefixed arguments
//! (`add_task(p_list_id, p_title)`) while callers send plain field names.
//! When the backing store reports that no function matches, the call is
//! retried once with the names remapped.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::auth::Credential;
use super::client::SupabaseClient;
use super::error::{GatewayError, GatewayResult};
use crate::logger;

const PARAM_PREFIX: &str = "p_";

/// PostgREST error body
#[derive(Debug, Default, Deserialize)]
pub struct UpstreamError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

impl UpstreamError {
    /// Parse an error body; non-JSON bodies become a bare message
    pub fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_else(|_| Self {
            message: Some(body.to_string()),
            ..Self::default()
        })
    }

    pub fn is_function_not_found(&self, status: u16) -> bool {
        match self.code.as_deref() {
            Some("PGRST202" | "42883") => true,
            _ => {
                status == 404
                    && self
                        .message
                        .as_deref()
                        .is_some_and(|m| m.contains("Could not find the function"))
            }
        }
    }
}

/// Parameter names listed in a hint such as
/// `Perhaps you meant to call the function public.add_task(p_list_id, p_title)`
pub fn hinted_param_names(hint: &str) -> Vec<String> {
    let Some(open) = hint.find('(') else {
        return Vec::new();
    };
    let Some(close) = hint[open..].find(')') else {
        return Vec::new();
    };
    hint[open + 1..open + close]
        .split(',')
        .filter_map(|p| p.split_whitespace().next())
        .map(ToString::to_string)
        .collect()
}

fn remap_key(key: &str, hinted: &[String]) -> String {
    if !hinted.is_empty() {
        if hinted.iter().any(|h| h == key) {
            return key.to_string();
        }
        let prefixed = format!("{PARAM_PREFIX}{key}");
        if hinted.contains(&prefixed) {
            return prefixed;
        }
        let suffix = format!("_{key}");
        let mut candidates = hinted.iter().filter(|h| h.ends_with(&suffix));
        if let (Some(only), None) = (candidates.next(), candidates.next()) {
            return only.clone();
        }
    }

    if key.starts_with(PARAM_PREFIX) {
        key.to_string()
    } else {
        format!("{PARAM_PREFIX}{key}")
    }
}

/// Remap top-level keys of an object body to the backing function's names.
///
/// Non-object bodies come back unchanged. Returns `None` when two keys
/// would land on the same name, since one value would be lost.
pub fn remap_params(body: &Value, hint: Option<&str>) -> Option<Value> {
    let Value::Object(fields) = body else {
        return Some(body.clone());
    };
    let hinted = hint.map(hinted_param_names).unwrap_or_default();
    let mut remapped = Map::with_capacity(fields.len());
    for (key, value) in fields {
        if remapped.insert(remap_key(key, &hinted), value.clone()).is_some() {
            return None;
        }
    }
    Some(Value::Object(remapped))
}

/// Call `function`, retrying once with remapped names on "function not found"
pub async fn call_with_fallback(
    client: &SupabaseClient,
    function: &str,
    body: &Value,
    credential: &Credential,
) -> GatewayResult<Value> {
    let (status, error_body) = match client.rpc_once(function, body, credential).await {
        Err(GatewayError::Upstream { status, body }) => (status, body),
        other => return other,
    };

    let upstream = UpstreamError::parse(&error_body);
    if !upstream.is_function_not_found(status) {
        return Err(GatewayError::Upstream {
            status,
            body: error_body,
        });
    }

    let remapped = match remap_params(body, upstream.hint.as_deref()) {
        Some(remapped) if &remapped != body => remapped,
        Some(_) => {
            return Err(GatewayError::Upstream {
                status,
                body: error_body,
            })
        }
        None => {
            logger::log_warning(&format!(
                "[RPC] {function}: remapped parameter names collide, not retrying"
            ));
            return Err(GatewayError::Upstream {
                status,
                body: error_body,
            });
        }
    };

    logger::log_rpc_fallback(function, &object_keys(body), &object_keys(&remapped));
    client.rpc_once(function, &remapped, credential).await
}

fn object_keys(value: &Value) -> Vec<String> {
    value
        .as_object()
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default()
}
