//! Per-site middleware: HTTPS redirect and website index rewrite

use axum::{
    extract::{Request, State},
    http::{
        header,
        uri::{PathAndQuery, Uri},
        HeaderMap,
    },
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tracing::debug;

const FORWARDED_PROTO: &str = "x-forwarded-proto";
const FORWARDED_HOST: &str = "x-forwarded-host";

/// Host a request was addressed to.
///
/// `X-Forwarded-Host` wins in proxied mode, then the `Host` header, then the
/// URI authority.
pub fn request_host(headers: &HeaderMap, uri: &Uri, proxied: bool) -> Option<String> {
    let forwarded = proxied.then(|| headers.get(FORWARDED_HOST)).flatten();
    forwarded
        .or_else(|| headers.get(header::HOST))
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| uri.authority().map(|a| a.as_str().to_string()))
}

fn is_secure(request: &Request, proxied: bool) -> bool {
    if request.uri().scheme_str() == Some("https") {
        return true;
    }
    proxied
        && request
            .headers()
            .get(FORWARDED_PROTO)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
}

/// Redirect plain HTTP requests to the same path and query over HTTPS.
///
/// State is the site's proxied flag.
pub async fn ssl_redirect(State(proxied): State<bool>, request: Request, next: Next) -> Response {
    if is_secure(&request, proxied) {
        return next.run(request).await;
    }

    let host = request_host(request.headers(), request.uri(), proxied).unwrap_or_default();
    let path_and_query = request
        .uri()
        .path_and_query()
        .map_or("/", PathAndQuery::as_str);
    let location = format!("https://{host}{path_and_query}");

    debug!(location = %location, "Redirecting to HTTPS");
    Redirect::temporary(&location).into_response()
}

/// Append the index document suffix to directory-style paths.
///
/// State is the suffix reported by the backend's website configuration.
pub async fn website_rewrite(
    State(suffix): State<Arc<str>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if path.is_empty() || path.ends_with('/') {
        let rewritten = match request.uri().query() {
            Some(query) => format!("{path}{suffix}?{query}"),
            None => format!("{path}{suffix}"),
        };

        if let Ok(path_and_query) = PathAndQuery::try_from(rewritten) {
            let mut parts = request.uri().clone().into_parts();
            parts.path_and_query = Some(path_and_query);
            if let Ok(uri) = Uri::from_parts(parts) {
                *request.uri_mut() = uri;
            }
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, Router};
    use tower::ServiceExt;

    /// Echoes the path and query it was called with
    fn echo() -> Router {
        Router::new().fallback(|uri: Uri| async move {
            uri.path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_default()
        })
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_plain_http_is_redirected() {
        let app = echo().layer(middleware::from_fn_with_state(false, ssl_redirect));
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/docs/a.txt?list=1")
                    .header("host", "files.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "https://files.example.com/docs/a.txt?list=1"
        );
    }

    #[tokio::test]
    async fn test_forwarded_https_passes_when_proxied() {
        let app = echo().layer(middleware::from_fn_with_state(true, ssl_redirect));
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/a.txt")
                    .header("host", "internal:8080")
                    .header(FORWARDED_PROTO, "https")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "/a.txt");
    }

    #[tokio::test]
    async fn test_forwarded_proto_ignored_unless_proxied() {
        let app = echo().layer(middleware::from_fn_with_state(false, ssl_redirect));
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/a.txt")
                    .header("host", "files.example.com")
                    .header(FORWARDED_PROTO, "https")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    }

    #[tokio::test]
    async fn test_proxied_redirect_uses_forwarded_host() {
        let app = echo().layer(middleware::from_fn_with_state(true, ssl_redirect));
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/")
                    .header("host", "internal:8080")
                    .header(FORWARDED_HOST, "files.example.com")
                    .header(FORWARDED_PROTO, "http")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "https://files.example.com/"
        );
    }

    #[tokio::test]
    async fn test_website_rewrite() {
        let suffix: Arc<str> = Arc::from("index.html");
        let app = echo().layer(middleware::from_fn_with_state(suffix, website_rewrite));

        let cases = [
            ("/", "/index.html"),
            ("/docs/", "/docs/index.html"),
            ("/docs/?x=1", "/docs/index.html?x=1"),
            ("/docs", "/docs"),
            ("/docs/page.html", "/docs/page.html"),
        ];
        for (input, expected) in cases {
            let response = app
                .clone()
                .oneshot(
                    axum::http::Request::builder()
                        .uri(input)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(body_text(response).await, expected, "{input}");
        }
    }

    #[test]
    fn test_request_host_fallbacks() {
        let uri: Uri = "http://authority.example.com/x".parse().unwrap();
        assert_eq!(
            request_host(&HeaderMap::new(), &uri, false).as_deref(),
            Some("authority.example.com")
        );
        assert_eq!(request_host(&HeaderMap::new(), &"/x".parse().unwrap(), false), None);
    }
}
