//! bucketgate - multi-tenant S3 gateway
//!
//! Serves one or more sites, each mapping a host name onto a backend bucket
//! with its own authentication and HTTP options.

mod config;
mod middleware;
mod reload;
mod router;
mod site;
mod store;

use bucketgate_core::Site;
use bucketgate_s3::{ObjectBackend, SdkBackend};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::reload::{PollingSource, ReloadWatcher};
use crate::store::{BackendFactory, ConfigStore};

#[derive(Parser, Debug)]
#[command(name = "bucketgate")]
#[command(about = "Multi-tenant S3 gateway", long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8080", env = "BUCKETGATE_PORT")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0", env = "BUCKETGATE_HOST")]
    host: String,

    /// Multi-site configuration file (YAML, or JSON by extension).
    /// Without it a single site is read from BUCKETGATE_* variables.
    #[arg(short, long, env = "BUCKETGATE_CONFIG")]
    config: Option<PathBuf>,

    /// How often to check the configuration file for changes
    #[arg(long, default_value = "1000", env = "BUCKETGATE_POLL_INTERVAL_MS")]
    poll_interval_ms: u64,

    /// Quiet period before a detected change is applied
    #[arg(long, default_value = "100", env = "BUCKETGATE_DEBOUNCE_MS")]
    debounce_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "BUCKETGATE_LOG_LEVEL")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("bucketgate={},tower_http=debug", args.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let backends: BackendFactory =
        Arc::new(|site: &Site| -> Arc<dyn ObjectBackend> { Arc::new(SdkBackend::from_site(site)) });

    info!("Starting bucketgate...");

    let shutdown = Arc::new(Notify::new());
    let store = match &args.config {
        Some(path) => {
            // Baseline before the first load so an edit in between is seen
            let source = PollingSource::new(path, Duration::from_millis(args.poll_interval_ms)).await;
            let store = Arc::new(ConfigStore::from_file(path, backends).await?);
            let table = store.current_route_table();
            for host in table.hosts() {
                info!("  Site: {host}");
            }

            let watcher = ReloadWatcher::new(
                Arc::clone(&store),
                Box::new(source),
                Duration::from_millis(args.debounce_ms),
            );
            tokio::spawn(watcher.run(Arc::clone(&shutdown)));
            store
        }
        None => {
            let site = config::legacy_site()?;
            info!("  Site: {} (all hosts)", site.aws_bucket);
            Arc::new(ConfigStore::from_site(&site, backends).await)
        }
    };

    if let Some(path) = store.source_path() {
        info!("Watching {} for changes", path.display());
    }

    let app = router::create_router(store);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    shutdown.notify_one();
    Ok(())
}
