//! Top-level HTTP router: host-based dispatch into site routers

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::store::ConfigStore;

/// Create the main application router
pub fn create_router(store: Arc<ConfigStore>) -> Router {
    Router::new()
        .fallback(dispatch)
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

/// Host the request was addressed to: the `Host` header, else the URI authority
fn host_of(request: &Request) -> Option<String> {
    request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.as_str().to_string()))
}

async fn dispatch(State(store): State<Arc<ConfigStore>>, request: Request) -> Response {
    let host = host_of(&request);
    let table = store.current_route_table();

    let Some(site) = table.dispatch(host.as_deref()) else {
        debug!(host = ?host, "No site for host");
        return (StatusCode::NOT_FOUND, "Not Found").into_response();
    };

    match site.oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}
