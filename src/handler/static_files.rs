//! Static file serving module
//!
//! Serves `routes.static_dir` under `routes.static_mount`.

use crate::http::{self, cache, mime};
use crate::logger;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::Response;
use std::path::Path;
use tokio::fs;

/// Serve `relative_path` from `static_dir`
pub async fn serve_directory(
    static_dir: &str,
    relative_path: &str,
    index_files: &[String],
    if_none_match: Option<&str>,
    is_head: bool,
) -> Response<Full<Bytes>> {
    match load_from_directory(static_dir, relative_path, index_files).await {
        Some((content, content_type)) => {
            let etag = cache::generate_etag(&content);
            if cache::check_etag_match(if_none_match, &etag) {
                return http::build_304_response(&etag);
            }
            http::build_cached_response(Bytes::from(content), content_type, &etag, is_head)
        }
        None => http::build_404_response(),
    }
}

/// Load a file below `static_dir`, resolving directories to index files
pub async fn load_from_directory(
    static_dir: &str,
    relative_path: &str,
    index_files: &[String],
) -> Option<(Vec<u8>, &'static str)> {
    let relative_path = relative_path.trim_start_matches('/');
    let mut file_path = Path::new(static_dir).join(relative_path);

    let static_dir_canonical = match Path::new(static_dir).canonicalize() {
        Ok(p) => p,
        Err(e) => {
            logger::log_warning(&format!(
                "Static directory not found or inaccessible '{static_dir}': {e}"
            ));
            return None;
        }
    };

    if file_path.is_dir() || relative_path.is_empty() || relative_path.ends_with('/') {
        if let Some(index_path) = index_files
            .iter()
            .map(|name| file_path.join(name))
            .find(|p| p.is_file())
        {
            file_path = index_path;
        }
    }

    // Missing files are an ordinary 404
    let Ok(file_path_canonical) = file_path.canonicalize() else {
        return None;
    };
    if !file_path_canonical.starts_with(&static_dir_canonical) {
        logger::log_warning(&format!(
            "Path traversal attempt blocked: {} -> {}",
            relative_path,
            file_path_canonical.display()
        ));
        return None;
    }
    if !file_path_canonical.is_file() {
        return None;
    }

    let content = match fs::read(&file_path_canonical).await {
        Ok(c) => c,
        Err(e) => {
            logger::log_error(&format!(
                "Failed to read file '{}': {}",
                file_path_canonical.display(),
                e
            ));
            return None;
        }
    };

    let content_type =
        mime::content_type_for(file_path_canonical.extension().and_then(|e| e.to_str()));
    Some((content, content_type))
}
