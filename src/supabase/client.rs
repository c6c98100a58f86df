//! Outbound client for the backing REST API
//!
//! Thin wrapper over a pooled `reqwest::Client`. Every call goes through
//! [`SupabaseClient::send`], which attaches credentials, logs the call and
//! turns non-2xx answers into [`GatewayError::Upstream`].

use chrono::Utc;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};

use super::auth::{CachedToken, Credential, TokenCache};
use super::error::{GatewayError, GatewayResult};
use crate::config::SupabaseConfig;
use crate::logger;

const NOT_CONFIGURED: &str = "SUPABASE_URL or SUPABASE_KEY";

/// Password-grant response from the auth endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

pub struct SupabaseClient {
    http: reqwest::Client,
    config: SupabaseConfig,
    tokens: TokenCache,
}

impl SupabaseClient {
    pub fn new(config: &SupabaseConfig) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let mut config = config.clone();
        if let Some(url) = config.url.as_mut() {
            let trimmed = url.trim_end_matches('/').len();
            url.truncate(trimmed);
        }

        Ok(Self {
            http,
            config,
            tokens: TokenCache::new(),
        })
    }

    pub fn table(&self) -> &str {
        &self.config.table
    }

    fn base_url(&self) -> GatewayResult<&str> {
        self.config
            .url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or(GatewayError::NotConfigured(NOT_CONFIGURED))
    }

    fn service_key(&self) -> Option<&str> {
        self.config.service_key.as_deref().filter(|k| !k.is_empty())
    }

    fn anon_key(&self) -> Option<&str> {
        self.config.anon_key.as_deref().filter(|k| !k.is_empty())
    }

    /// Pick the identity for an outbound call.
    ///
    /// A caller token always wins. Without one, a configured dev login is
    /// used (cached until near expiry). The service-role key is the last
    /// resort.
    pub async fn resolve_credential(&self, caller: Option<String>) -> GatewayResult<Credential> {
        self.base_url()?;

        if let Some(token) = caller {
            return Ok(Credential::Caller(token));
        }

        if let Some((email, password)) = self.config.dev_credentials() {
            let token = self
                .tokens
                .get_or_refresh(|| self.login(email, password))
                .await?;
            return Ok(Credential::DevSession(token));
        }

        self.service_key()
            .map(|key| Credential::ServiceRole(key.to_string()))
            .ok_or(GatewayError::NotConfigured(NOT_CONFIGURED))
    }

    /// Password login against `/auth/v1/token`
    async fn login(&self, email: &str, password: &str) -> GatewayResult<CachedToken> {
        let url = format!("{}/auth/v1/token", self.base_url()?);
        let mut req = self
            .http
            .post(&url)
            .query(&[("grant_type", "password")])
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .json(&serde_json::json!({ "email": email, "password": password }));
        if let Some(key) = self.anon_key().or_else(|| self.service_key()) {
            req = req.header("apikey", key);
        }

        let started = Instant::now();
        let resp = req.send().await?;
        let status = resp.status().as_u16();
        logger::log_upstream("POST", "/auth/v1/token", status, started.elapsed(), "password");

        let text = resp.text().await?;
        if status >= 400 {
            return Err(GatewayError::AuthFailed(text));
        }

        let parsed: TokenResponse =
            serde_json::from_str(&text).map_err(|e| GatewayError::AuthFailed(e.to_string()))?;
        let token = CachedToken::new(parsed.access_token, parsed.expires_in, Utc::now());
        logger::log_token_refreshed(&token.expires_at);
        Ok(token)
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        credential: &Credential,
    ) -> GatewayResult<RequestBuilder> {
        let url = format!("{}/rest/v1/{}", self.base_url()?, path);
        let mut req = self
            .http
            .request(method, url)
            .header(AUTHORIZATION, format!("Bearer {}", credential.bearer()))
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json");
        if let Some(key) = credential.api_key(self.anon_key(), self.service_key()) {
            req = req.header("apikey", key);
        }
        Ok(req)
    }

    /// Send a prepared request and decode the JSON answer.
    ///
    /// An empty 2xx body decodes to `Value::Null`.
    async fn send(
        &self,
        method: &str,
        path: &str,
        req: RequestBuilder,
        credential: &Credential,
    ) -> GatewayResult<Value> {
        let started = Instant::now();
        let resp = req.send().await?;
        let status = resp.status().as_u16();
        logger::log_upstream(method, path, status, started.elapsed(), credential.label());

        let text = resp.text().await?;
        if status >= 400 {
            // A rejected dev token is dropped so the next call logs in again
            if status == 401 && matches!(credential, Credential::DevSession(_)) {
                self.tokens.clear().await;
            }
            return Err(GatewayError::Upstream { status, body: text });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| GatewayError::Decode(e.to_string()))
    }

    /// `GET /rest/v1/{table}` with a raw PostgREST query string
    pub async fn select(
        &self,
        table: &str,
        query: Option<&str>,
        credential: &Credential,
    ) -> GatewayResult<Value> {
        let path = match query.filter(|q| !q.is_empty()) {
            Some(q) => format!("{table}?{q}"),
            None => table.to_string(),
        };
        let req = self.request(Method::GET, &path, credential)?;
        self.send("GET", &path, req, credential).await
    }

    /// `GET /rest/v1/{table}?id=eq.{id}`
    pub async fn select_by_id(
        &self,
        table: &str,
        id: &str,
        credential: &Credential,
    ) -> GatewayResult<Value> {
        let path = format!("{table}?id=eq.{id}");
        let req = self.request(Method::GET, &path, credential)?;
        self.send("GET", &path, req, credential).await
    }

    pub async fn insert(
        &self,
        table: &str,
        payload: &Value,
        credential: &Credential,
    ) -> GatewayResult<Value> {
        let req = self
            .request(Method::POST, table, credential)?
            .header("Prefer", "return=representation")
            .json(payload);
        self.send("POST", table, req, credential).await
    }

    pub async fn update(
        &self,
        table: &str,
        id: &str,
        payload: &Value,
        credential: &Credential,
    ) -> GatewayResult<Value> {
        let path = format!("{table}?id=eq.{id}");
        let req = self
            .request(Method::PATCH, &path, credential)?
            .header("Prefer", "return=representation")
            .json(payload);
        self.send("PATCH", &path, req, credential).await
    }

    pub async fn delete(&self, table: &str, id: &str, credential: &Credential) -> GatewayResult<()> {
        let path = format!("{table}?id=eq.{id}");
        let req = self.request(Method::DELETE, &path, credential)?;
        self.send("DELETE", &path, req, credential).await.map(|_| ())
    }

    /// Single `POST /rest/v1/rpc/{function}` call, no fallback
    pub async fn rpc_once(
        &self,
        function: &str,
        body: &Value,
        credential: &Credential,
    ) -> GatewayResult<Value> {
        let path = format!("rpc/{function}");
        let req = self.request(Method::POST, &path, credential)?.json(body);
        self.send("POST", &path, req, credential).await
    }
}

/// First element of a non-empty array, otherwise the value itself
pub fn unwrap_single(value: Value) -> Value {
    match value {
        Value::Array(mut rows) if !rows.is_empty() => rows.swap_remove(0),
        other => other,
    }
}
