//! Forwarding handlers
//!
//! Table CRUD and RPC passthrough. Each handler reads the body, selects a
//! credential, makes the outbound call and reshapes the answer.

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::{Method, Request, Response, StatusCode};
use serde_json::{json, Value};

use crate::config::AppState;
use crate::http;
use crate::logger;
use crate::supabase::{
    call_with_fallback, caller_token, unwrap_single, GatewayError, GatewayResult, SupabaseClient,
};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// CRUD operation selected by method and presence of an id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOp {
    List,
    Get,
    Create,
    Update,
    Delete,
}

impl TableOp {
    pub fn from_request(method: &Method, has_id: bool) -> Option<Self> {
        match (method, has_id) {
            (&Method::GET | &Method::HEAD, false) => Some(Self::List),
            (&Method::GET | &Method::HEAD, true) => Some(Self::Get),
            (&Method::POST, false) => Some(Self::Create),
            (&Method::PUT | &Method::PATCH, true) => Some(Self::Update),
            (&Method::DELETE, true) => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Row ids are forwarded into `id=eq.{id}` filters, so only plain tokens pass
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Collect the request body, enforcing `max_body_size`
pub async fn read_body<B>(body: B, max_body_size: u64) -> Result<Bytes, Response<Full<Bytes>>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let limit = usize::try_from(max_body_size).unwrap_or(usize::MAX);
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(http::build_413_response()),
        Err(e) => {
            logger::log_warning(&format!("Failed to read request body: {e}"));
            Err(http::build_400_response("failed to read request body"))
        }
    }
}

/// Parse a JSON body; an empty body yields `empty` when given
fn parse_json(body: &Bytes, empty: Option<Value>) -> GatewayResult<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        if let Some(default) = empty {
            return Ok(default);
        }
    }
    serde_json::from_slice(body).map_err(|e| GatewayError::InvalidPayload(e.to_string()))
}

fn parse_object(body: &Bytes) -> GatewayResult<Value> {
    match parse_json(body, None) {
        Ok(v @ Value::Object(_)) => Ok(v),
        Ok(_) | Err(_) => Err(GatewayError::InvalidPayload("invalid payload".into())),
    }
}

/// `{mount}/[{id}]` and `/api/{resource}/[{id}]`
pub async fn handle_table<B>(
    req: Request<B>,
    state: &AppState,
    table: &str,
    id: Option<&str>,
) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let is_head = req.method() == Method::HEAD;
    let Some(op) = TableOp::from_request(req.method(), id.is_some()) else {
        return http::build_405_response();
    };
    if let Some(id) = id {
        if !is_valid_id(id) {
            return http::build_400_response("invalid id");
        }
    }

    let query = req.uri().query().map(ToString::to_string);
    let caller = caller_token(req.headers());
    let body = match read_body(req.into_body(), state.config.http.max_body_size).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let request = TableRequest {
        op,
        table,
        id,
        query: query.as_deref(),
        body: &body,
    };
    match run_table_op(&state.supabase, request, caller).await {
        Ok(value) => http::build_json_response(StatusCode::OK, &value, is_head),
        Err(e) => http::build_error_response(&e),
    }
}

pub struct TableRequest<'a> {
    pub op: TableOp,
    pub table: &'a str,
    pub id: Option<&'a str>,
    /// Raw query string, forwarded as PostgREST filters for `List`
    pub query: Option<&'a str>,
    pub body: &'a Bytes,
}

pub async fn run_table_op(
    client: &SupabaseClient,
    request: TableRequest<'_>,
    caller: Option<String>,
) -> GatewayResult<Value> {
    let TableRequest {
        op,
        table,
        id,
        query,
        body,
    } = request;
    let id = id.unwrap_or_default();

    let payload = match op {
        TableOp::Create | TableOp::Update => Some(parse_object(body)?),
        _ => None,
    };
    let credential = client.resolve_credential(caller).await?;

    match (op, payload) {
        (TableOp::List, _) => client.select(table, query, &credential).await,
        (TableOp::Get, _) => {
            let rows = client.select_by_id(table, id, &credential).await?;
            match rows {
                Value::Array(ref r) if r.is_empty() => {
                    Err(GatewayError::NotFound("item not found".into()))
                }
                Value::Null => Err(GatewayError::NotFound("item not found".into())),
                rows => Ok(unwrap_single(rows)),
            }
        }
        (TableOp::Create, Some(payload)) => client
            .insert(table, &payload, &credential)
            .await
            .map(unwrap_single),
        (TableOp::Update, Some(payload)) => client
            .update(table, id, &payload, &credential)
            .await
            .map(unwrap_single),
        (TableOp::Delete, _) => client
            .delete(table, id, &credential)
            .await
            .map(|()| json!({ "deleted": true })),
        (TableOp::Create | TableOp::Update, None) => {
            Err(GatewayError::InvalidPayload("invalid payload".into()))
        }
    }
}

/// `POST /rpc/{function}`
pub async fn handle_rpc<B>(req: Request<B>, state: &AppState, function: &str) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    if req.method() != Method::POST {
        return http::build_405_response();
    }

    let caller = caller_token(req.headers());
    let body = match read_body(req.into_body(), state.config.http.max_body_size).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    match run_rpc(&state.supabase, function, &body, caller).await {
        Ok(value) => http::build_json_response(StatusCode::OK, &value, false),
        Err(e) => http::build_error_response(&e),
    }
}

pub async fn run_rpc(
    client: &SupabaseClient,
    function: &str,
    body: &Bytes,
    caller: Option<String>,
) -> GatewayResult<Value> {
    let params = parse_json(body, Some(json!({})))?;
    let credential = client.resolve_credential(caller).await?;
    call_with_fallback(client, function, &params, &credential).await
}
