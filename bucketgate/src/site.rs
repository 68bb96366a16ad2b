//! Assembly of one site's request handler

use axum::{middleware, Router};
use bucketgate_auth::{require_basic_auth, BasicAuthState, UserTable};
use bucketgate_core::Site;
use bucketgate_s3::{ObjectBackend, S3State};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer};
use tracing::{info, warn};

use crate::middleware::{ssl_redirect, website_rewrite};

/// Index document suffix for website mode, `None` when unavailable
async fn index_suffix(site: &Site, backend: &dyn ObjectBackend) -> Option<Arc<str>> {
    if !site.options.website {
        return None;
    }
    match backend.website_config().await {
        Ok(config) => config
            .index_suffix
            .filter(|s| !s.is_empty())
            .map(Arc::from),
        Err(e) => {
            warn!(
                host = %site.host,
                bucket = %site.aws_bucket,
                error = %e,
                "Website configuration unavailable, serving without index rewrite"
            );
            None
        }
    }
}

/// Wire a site's middleware chain around its object router.
///
/// Layers wrap outward: website rewrite, basic auth, compression, CORS and
/// finally the HTTPS redirect, which sees every request first.
pub async fn build_site_router(site: &Site, backend: Arc<dyn ObjectBackend>) -> Router {
    let suffix = index_suffix(site, backend.as_ref()).await;
    let state = Arc::new(S3State::new(backend, site.key_prefix()));
    let mut router = bucketgate_s3::router(state);

    if let Some(suffix) = suffix {
        info!(host = %site.host, suffix = %suffix, "Website mode enabled");
        router = router.layer(middleware::from_fn_with_state(suffix, website_rewrite));
    }

    if !site.users.is_empty() {
        let auth = BasicAuthState {
            users: UserTable::new(&site.users),
            proxied: site.options.proxied,
        };
        router = router.layer(middleware::from_fn_with_state(auth, require_basic_auth));
    }

    if site.options.gzip {
        router = router.layer(CompressionLayer::new());
    }

    if site.options.cors {
        router = router.layer(CorsLayer::permissive());
    }

    if site.options.force_ssl {
        router = router.layer(middleware::from_fn_with_state(
            site.options.proxied,
            ssl_redirect,
        ));
    }

    router
}
