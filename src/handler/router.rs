//! Request routing dispatch module
//!
//! Entry point for HTTP request processing: method and body-size checks,
//! route matching, dispatch, response decoration and access logging.

use crate::config::{AppState, HttpConfig, RoutesConfig};
use crate::handler::proxy::{self, BoxError};
use crate::handler::{demo, static_files};
use crate::http;
use crate::logger::{self, AccessLogEntry};
use crate::supabase::caller_token;
use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::header::HeaderValue;
use hyper::{HeaderMap, Method, Request, Response, StatusCode, Version};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Where a request path leads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Root,
    Health,
    Hello(String),
    Env,
    /// Path relative to the static mount
    Static(String),
    Table {
        table: String,
        id: Option<String>,
    },
    Rpc(String),
    NotFound,
}

/// Main entry point for HTTP request handling
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    remote_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let started = Instant::now();
    let entry = state
        .config
        .logging
        .access_log
        .then(|| access_entry(&req, remote_addr));

    let mut response = dispatch(req, &state).await;
    decorate(&mut response, &state.config.http);

    if let Some(mut entry) = entry {
        entry.status = response.status().as_u16();
        entry.body_bytes = response
            .body()
            .size_hint()
            .exact()
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0);
        entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

async fn dispatch<B>(req: Request<B>, state: &AppState) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let method = req.method().clone();

    // 1. Check HTTP method
    if let Some(resp) = check_http_method(&method, state.config.http.enable_cors) {
        return resp;
    }

    // 2. Check declared body size
    if let Some(resp) = check_body_size(req.headers(), state.config.http.max_body_size) {
        return resp;
    }

    logger::log_headers_count(req.headers().len(), state.config.logging.show_headers);

    let route = resolve_route(req.uri().path(), &state.config.routes, state.supabase.table());
    let is_read = method == Method::GET || method == Method::HEAD;
    let is_head = method == Method::HEAD;

    match route {
        Route::Table { table, id } => proxy::handle_table(req, state, &table, id.as_deref()).await,
        Route::Rpc(function) => proxy::handle_rpc(req, state, &function).await,
        Route::NotFound => http::build_404_response(),
        _ if !is_read => http::build_405_response(),
        Route::Root => http::build_json_response(StatusCode::OK, &demo::root(), is_head),
        Route::Health => http::build_json_response(StatusCode::OK, &demo::health(), is_head),
        Route::Hello(name) => {
            http::build_json_response(StatusCode::OK, &demo::hello(&name), is_head)
        }
        Route::Env => http::build_json_response(
            StatusCode::OK,
            &demo::env(&state.config.demo.message),
            is_head,
        ),
        Route::Static(relative) => {
            let if_none_match = req
                .headers()
                .get("if-none-match")
                .and_then(|v| v.to_str().ok());
            static_files::serve_directory(
                &state.config.routes.static_dir,
                &relative,
                &state.config.routes.index_files,
                if_none_match,
                is_head,
            )
            .await
        }
    }
}

/// Answer OPTIONS and reject methods the gateway never serves
fn check_http_method(method: &Method, enable_cors: bool) -> Option<Response<Full<Bytes>>> {
    match *method {
        Method::GET | Method::HEAD | Method::POST | Method::PUT | Method::PATCH | Method::DELETE => {
            None
        }
        Method::OPTIONS => Some(http::build_options_response(enable_cors)),
        _ => {
            logger::log_warning(&format!("Method not allowed: {method}"));
            Some(http::build_405_response())
        }
    }
}

/// Validate Content-Length header and return 413 if exceeded
fn check_body_size(headers: &HeaderMap, max_body_size: u64) -> Option<Response<Full<Bytes>>> {
    let content_length = headers.get("content-length")?;
    content_length.to_str().map_or_else(
        |_| {
            logger::log_warning("Content-Length header contains non-ASCII characters");
            None
        },
        |size_str| match size_str.parse::<u64>() {
            Ok(size) if size > max_body_size => {
                logger::log_warning(&format!(
                    "Request body too large: {size} bytes (max: {max_body_size})"
                ));
                Some(http::build_413_response())
            }
            Err(_) => {
                logger::log_warning(&format!(
                    "Invalid Content-Length value: '{size_str}', skipping size check"
                ));
                None
            }
            _ => None,
        },
    )
}

/// Map a request path onto a [`Route`]
pub fn resolve_route(path: &str, routes: &RoutesConfig, default_table: &str) -> Route {
    if path == "/" {
        return Route::Root;
    }
    if path == routes.health_path {
        return Route::Health;
    }
    if path == "/env" {
        return Route::Env;
    }

    if let Some(name) = path.strip_prefix("/hi/") {
        if !name.is_empty() && !name.contains('/') {
            return Route::Hello(demo::percent_decode(name));
        }
        return Route::NotFound;
    }

    if let Some(rest) = strip_mount(path, &routes.static_mount) {
        return Route::Static(rest.trim_start_matches('/').to_string());
    }

    if let Some(rest) = strip_mount(path, &routes.table_mount) {
        return collection(default_table, rest);
    }

    if let Some(rest) = path.strip_prefix("/api/") {
        let (resource, remainder) = rest.find('/').map_or((rest, ""), |i| rest.split_at(i));
        if routes.resources.iter().any(|r| r == resource) {
            return collection(resource, remainder);
        }
        return Route::NotFound;
    }

    if let Some(function) = path.strip_prefix("/rpc/") {
        let function = function.trim_end_matches('/');
        if !function.is_empty()
            && function
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            return Route::Rpc(function.to_string());
        }
    }

    Route::NotFound
}

/// Remainder of `path` below `mount`, if `path` is the mount or inside it
fn strip_mount<'a>(path: &'a str, mount: &str) -> Option<&'a str> {
    let mount = mount.trim_end_matches('/');
    if mount.is_empty() {
        return None;
    }
    let rest = path.strip_prefix(mount)?;
    (rest.is_empty() || rest.starts_with('/')).then_some(rest)
}

/// `""` or `"/"` is the collection, `"/{id}"` one item, anything deeper is unknown
fn collection(table: &str, rest: &str) -> Route {
    let segment = rest.trim_start_matches('/').trim_end_matches('/');
    if segment.contains('/') {
        return Route::NotFound;
    }
    Route::Table {
        table: table.to_string(),
        id: (!segment.is_empty()).then(|| segment.to_string()),
    }
}

/// Server and CORS headers on every response
fn decorate(response: &mut Response<Full<Bytes>>, http_config: &HttpConfig) {
    let headers = response.headers_mut();
    if let Ok(server) = HeaderValue::from_str(&http_config.server_name) {
        headers.insert("Server", server);
    }
    if http_config.enable_cors {
        headers
            .entry("Access-Control-Allow-Origin")
            .or_insert(HeaderValue::from_static("*"));
    }
}

fn access_entry<B>(req: &Request<B>, remote_addr: SocketAddr) -> AccessLogEntry {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };

    let mut entry = AccessLogEntry::new(
        remote_addr.ip().to_string(),
        req.method().to_string(),
        req.uri().path().to_string(),
    );
    entry.query = req.uri().query().map(ToString::to_string);
    entry.http_version = match req.version() {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2.0",
        Version::HTTP_3 => "3.0",
        _ => "1.1",
    }
    .to_string();
    entry.referer = header("referer");
    entry.user_agent = header("user-agent");
    entry.authenticated = caller_token(req.headers()).is_some();
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn routes() -> RoutesConfig {
        test_config(&[]).routes
    }

    fn test_config(vars: &[(&str, &str)]) -> Config {
        let vars: Vec<(String, String)> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let mut config = Config::load_with_env("does-not-exist/config", move |name| {
            vars.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
        })
        .unwrap();
        config.logging.access_log = false;
        config
    }

    fn state_for(url: Option<&str>) -> Arc<AppState> {
        let config = match url {
            Some(url) => test_config(&[
                ("SUPABASE_URL", url),
                ("SUPABASE_KEY", "service-key"),
                ("MESSAGE", "from-env"),
            ]),
            None => test_config(&[("MESSAGE", "from-env")]),
        };
        Arc::new(AppState::new(&config).unwrap())
    }

    fn request(method: &str, uri: &str, body: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    async fn send(state: &Arc<AppState>, req: Request<Full<Bytes>>) -> (StatusCode, Value) {
        let addr: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let resp = handle_request(req, Arc::clone(state), addr).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[test]
    fn test_resolve_fixed_routes() {
        let r = routes();
        assert_eq!(resolve_route("/", &r, "mobile01"), Route::Root);
        assert_eq!(resolve_route("/health", &r, "mobile01"), Route::Health);
        assert_eq!(resolve_route("/env", &r, "mobile01"), Route::Env);
        assert_eq!(
            resolve_route("/hi/Jos%C3%A9", &r, "mobile01"),
            Route::Hello("José".to_string())
        );
        assert_eq!(resolve_route("/hi/", &r, "mobile01"), Route::NotFound);
        assert_eq!(resolve_route("/nowhere", &r, "mobile01"), Route::NotFound);
    }

    #[test]
    fn test_resolve_table_routes() {
        let r = routes();
        let table = |t: &str, id: Option<&str>| Route::Table {
            table: t.to_string(),
            id: id.map(ToString::to_string),
        };
        assert_eq!(resolve_route("/mobile01", &r, "mobile01"), table("mobile01", None));
        assert_eq!(resolve_route("/mobile01/", &r, "mobile01"), table("mobile01", None));
        assert_eq!(
            resolve_route("/mobile01/42", &r, "mobile01"),
            table("mobile01", Some("42"))
        );
        assert_eq!(resolve_route("/mobile01x", &r, "mobile01"), Route::NotFound);
        assert_eq!(resolve_route("/mobile01/1/2", &r, "mobile01"), Route::NotFound);
        assert_eq!(resolve_route("/api/tasks", &r, "mobile01"), table("tasks", None));
        assert_eq!(
            resolve_route("/api/reminders/7/", &r, "mobile01"),
            table("reminders", Some("7"))
        );
        assert_eq!(resolve_route("/api/users", &r, "mobile01"), Route::NotFound);
        // Mount follows the configured table, not the path
        assert_eq!(resolve_route("/mobile01/", &r, "todos"), table("todos", None));
    }

    #[test]
    fn test_resolve_static_and_rpc() {
        let r = routes();
        assert_eq!(resolve_route("/web", &r, "t"), Route::Static(String::new()));
        assert_eq!(
            resolve_route("/web/css/app.css", &r, "t"),
            Route::Static("css/app.css".to_string())
        );
        assert_eq!(resolve_route("/webapp", &r, "t"), Route::NotFound);
        assert_eq!(
            resolve_route("/rpc/add_numbers", &r, "t"),
            Route::Rpc("add_numbers".to_string())
        );
        assert_eq!(resolve_route("/rpc/", &r, "t"), Route::NotFound);
        assert_eq!(resolve_route("/rpc/a;drop", &r, "t"), Route::NotFound);
    }

    #[tokio::test]
    async fn test_demo_endpoints() {
        let state = state_for(None);

        let (status, body) = send(&state, request("GET", "/hi/Ada%20L", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Hello, Ada L!");

        let (_, body) = send(&state, request("GET", "/env", "")).await;
        assert_eq!(
            body["message"],
            "Here is an example of getting an environment variable: from-env"
        );

        let (status, body) = send(&state, request("GET", "/health", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));

        let (status, _) = send(&state, request("POST", "/health", "")).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_missing_configuration() {
        let state = state_for(None);
        let (status, body) = send(&state, request("GET", "/mobile01/", "")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({"detail": "SUPABASE_URL or SUPABASE_KEY not configured"})
        );
    }

    #[tokio::test]
    async fn test_method_and_size_guards() {
        let state = state_for(Some("http://127.0.0.1:9"));

        let (status, _) = send(&state, request("TRACE", "/", "")).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        let (status, _) = send(&state, request("POST", "/mobile01/5", "{}")).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        let (status, body) = send(&state, request("GET", "/mobile01/1,2", "")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"detail": "invalid id"}));

        let (status, _) = send(&state, request("GET", "/api/users", "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let req = Request::builder()
            .method("POST")
            .uri("/mobile01/")
            .header("content-length", "99999999")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let (status, _) = send(&state, req).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_options_and_decoration() {
        let state = state_for(None);
        let addr: SocketAddr = "127.0.0.1:40000".parse().unwrap();

        let resp = handle_request(request("OPTIONS", "/api/tasks", ""), Arc::clone(&state), addr)
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(resp.headers()["Access-Control-Allow-Origin"], "*");

        let resp = handle_request(request("GET", "/", ""), state, addr).await.unwrap();
        assert_eq!(resp.headers()["Server"], "supabase-gateway/0.1");
        assert_eq!(resp.headers()["Access-Control-Allow-Origin"], "*");
    }

    #[tokio::test]
    async fn test_item_crud_reshaping() {
        let server = MockServer::start().await;
        let state = state_for(Some(&server.uri()));

        Mock::given(method("GET"))
            .and(path("/rest/v1/mobile01"))
            .and(query_param("id", "eq.404"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/mobile01"))
            .and(query_param("id", "eq.7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 7}])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/tasks"))
            .and(header("Prefer", "return=representation"))
            .and(body_json(json!({"title": "write docs"})))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!([{"id": 1, "title": "write docs"}])),
            )
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/tags"))
            .and(query_param("id", "eq.3"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let (status, body) = send(&state, request("GET", "/mobile01/404", "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"detail": "item not found"}));

        let (status, body) = send(&state, request("GET", "/mobile01/7", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"id": 7}));

        let (status, body) =
            send(&state, request("POST", "/api/tasks", r#"{"title":"write docs"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"id": 1, "title": "write docs"}));

        let (status, body) = send(&state, request("POST", "/api/tasks", "[1,2]")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"detail": "invalid payload"}));

        let (status, body) = send(&state, request("DELETE", "/api/tags/3", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"deleted": true}));
    }

    #[tokio::test]
    async fn test_list_forwards_filters_and_caller_token() {
        let server = MockServer::start().await;
        let state = state_for(Some(&server.uri()));

        Mock::given(method("GET"))
            .and(path("/rest/v1/tasks"))
            .and(query_param("done", "eq.false"))
            .and(header("Authorization", "Bearer user-jwt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}, {"id": 2}])))
            .expect(1)
            .mount(&server)
            .await;

        let req = Request::builder()
            .method("GET")
            .uri("/api/tasks?done=eq.false")
            .header("authorization", "bearer user-jwt")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let (status, body) = send(&state, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([{"id": 1}, {"id": 2}]));
    }

    #[tokio::test]
    async fn test_rpc_passthrough_and_upstream_error() {
        let server = MockServer::start().await;
        let state = state_for(Some(&server.uri()));

        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/ping"))
            .and(body_json(json!({})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!("pong")))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/mobile01"))
            .respond_with(ResponseTemplate::new(400).set_body_string("column missing"))
            .mount(&server)
            .await;

        let (status, body) = send(&state, request("POST", "/rpc/ping", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!("pong"));

        let (status, _) = send(&state, request("GET", "/rpc/ping", "")).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        let (status, body) = send(&state, request("PUT", "/mobile01/9", r#"{"x":1}"#)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"detail": {"supabase_error": "column missing"}}));
    }
}
