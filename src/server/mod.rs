//! HTTP serving of a mirror tree
//!
//! Every request under the route prefix goes through the
//! [`SnapshotResolver`]; anything it cannot resolve is a plain 404. A path
//! that only matched a directory's `index.html` is redirected to its
//! trailing-slash form first, so relative links in the page resolve.

use crate::resolve::SnapshotResolver;
use crate::MirrorError;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Default route prefix
pub const DEFAULT_PREFIX: &str = "/site";

const CACHE_CONTROL: &str = "public, max-age=0";

#[derive(Debug)]
struct ServerState {
    resolver: SnapshotResolver,
    prefix: String,
}

/// Normalizes a route prefix to `/name` form (empty for the site root)
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

/// Builds the router serving `root` under `prefix`
pub fn router(root: impl Into<PathBuf>, prefix: &str) -> Router {
    let state = Arc::new(ServerState {
        resolver: SnapshotResolver::new(root),
        prefix: normalize_prefix(prefix),
    });

    Router::new().fallback(handle_request).with_state(state)
}

/// Serves the mirror until the process is stopped
pub async fn serve(root: PathBuf, addr: SocketAddr, prefix: &str) -> Result<(), MirrorError> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(
        "Serving {} on http://{}{}/",
        root.display(),
        listener.local_addr()?,
        normalize_prefix(prefix)
    );

    axum::serve(listener, router(root, prefix)).await?;
    Ok(())
}

async fn handle_request(
    State(state): State<Arc<ServerState>>,
    method: Method,
    uri: Uri,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed").into_response();
    }

    let path = uri.path();
    if !state.prefix.is_empty() && path == state.prefix {
        let location = format!("{}/", state.prefix);
        return (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response();
    }

    let Some(relative) = path
        .strip_prefix(state.prefix.as_str())
        .and_then(|rest| rest.strip_prefix('/'))
    else {
        return not_found();
    };

    let Some(resolved) = state.resolver.resolve(relative) else {
        tracing::debug!("Unresolved request {}", path);
        return not_found();
    };

    if resolved.directory_index {
        let location = match uri.query() {
            Some(query) => format!("{}/?{}", path, query),
            None => format!("{}/", path),
        };
        return (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response();
    }

    let (length, body) = if method == Method::HEAD {
        match tokio::fs::metadata(&resolved.path).await {
            Ok(metadata) => (metadata.len(), Body::empty()),
            Err(e) => {
                tracing::warn!("Cannot stat {}: {}", resolved.path.display(), e);
                return not_found();
            }
        }
    } else {
        match tokio::fs::read(&resolved.path).await {
            Ok(bytes) => (bytes.len() as u64, Body::from(bytes)),
            Err(e) => {
                tracing::warn!("Cannot read {}: {}", resolved.path.display(), e);
                return not_found();
            }
        }
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(resolved.content_type)),
            (header::CONTENT_LENGTH, HeaderValue::from(length)),
            (header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL)),
        ],
        body,
    )
        .into_response()
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        "Not Found",
    )
        .into_response()
}
