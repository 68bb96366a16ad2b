//! Route tables and the hot-swappable configuration store

use axum::Router;
use bucketgate_core::{ConfigError, Site};
use bucketgate_s3::ObjectBackend;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::load_sites;
use crate::site::build_site_router;

/// Builds the backend client for a site
pub type BackendFactory = Arc<dyn Fn(&Site) -> Arc<dyn ObjectBackend> + Send + Sync>;

/// Immutable host to handler mapping.
///
/// A table is built completely before it is published and never changes
/// afterwards.
pub struct RouteTable {
    routes: HashMap<String, Router>,
    /// Serves every host in legacy single-site mode
    fallback: Option<Router>,
}

impl RouteTable {
    /// Wire a router for each site, keyed by exact host name
    pub async fn build(sites: &[Site], backends: &BackendFactory) -> Self {
        let mut routes = HashMap::with_capacity(sites.len());
        for site in sites {
            let router = build_site_router(site, backends(site)).await;
            if routes.insert(site.host.clone(), router).is_some() {
                warn!(host = %site.host, "Duplicate host, later site wins");
            }
        }
        Self {
            routes,
            fallback: None,
        }
    }

    /// A table whose single router answers for every host
    pub fn single(router: Router) -> Self {
        Self {
            routes: HashMap::new(),
            fallback: Some(router),
        }
    }

    /// Handler for a host, exact match only
    pub fn dispatch(&self, host: Option<&str>) -> Option<Router> {
        if let Some(fallback) = &self.fallback {
            return Some(fallback.clone());
        }
        host.and_then(|h| self.routes.get(h)).cloned()
    }

    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.routes.len() + usize::from(self.fallback.is_some())
    }
}

/// Parse, validate and wire a sites file into a new table
pub async fn load(path: &Path, backends: &BackendFactory) -> Result<RouteTable, ConfigError> {
    let sites = load_sites(path).await?;
    Ok(RouteTable::build(&sites, backends).await)
}

/// Holds the currently published route table
pub struct ConfigStore {
    current: RwLock<Arc<RouteTable>>,
    source: Option<PathBuf>,
    backends: BackendFactory,
}

impl ConfigStore {
    /// Load a sites file; any error fails construction
    pub async fn from_file(
        path: impl Into<PathBuf>,
        backends: BackendFactory,
    ) -> Result<Self, ConfigError> {
        let path = path.into();
        let table = load(&path, &backends).await?;
        info!(path = %path.display(), sites = table.len(), "Loaded site configuration");
        Ok(Self {
            current: RwLock::new(Arc::new(table)),
            source: Some(path),
            backends,
        })
    }

    /// Serve one site for every host, with nothing to reload
    pub async fn from_site(site: &Site, backends: BackendFactory) -> Self {
        let router = build_site_router(site, backends(site)).await;
        Self {
            current: RwLock::new(Arc::new(RouteTable::single(router))),
            source: None,
            backends,
        }
    }

    /// Snapshot of the latest published table.
    ///
    /// The read lock is held only for the clone; callers keep serving from
    /// the snapshot even if a newer table is published meanwhile.
    pub fn current_route_table(&self) -> Arc<RouteTable> {
        Arc::clone(&self.current.read())
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Rebuild from the source file and publish the result.
    ///
    /// On error the previous table stays in effect.
    pub async fn reload(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.source else {
            return Ok(());
        };

        let table = Arc::new(load(path, &self.backends).await?);
        let sites = table.len();
        *self.current.write() = table;

        info!(path = %path.display(), sites, "Published new route table");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucketgate_s3::MemoryBackend;
    use std::io::Write;

    const ONE_SITE: &str = "
- host: a.example.com
  awsKey: k
  awsSecret: s
  awsRegion: us-east-1
  awsBucket: a
";

    const TWO_SITES: &str = "
- host: a.example.com
  awsKey: k
  awsSecret: s
  awsRegion: us-east-1
  awsBucket: a
- host: b.example.com
  awsKey: k
  awsSecret: s
  awsRegion: us-east-1
  awsBucket: b
";

    fn memory_backends() -> BackendFactory {
        Arc::new(|site: &Site| -> Arc<dyn ObjectBackend> {
            Arc::new(MemoryBackend::new(&site.aws_bucket))
        })
    }

    fn write_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn overwrite(path: &Path, contents: &str) {
        std::fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn test_load_valid_file() {
        let file = write_file(TWO_SITES);
        let store = ConfigStore::from_file(file.path(), memory_backends())
            .await
            .unwrap();

        let table = store.current_route_table();
        assert_eq!(table.len(), 2);
        assert!(table.dispatch(Some("a.example.com")).is_some());
        assert!(table.dispatch(Some("b.example.com")).is_some());
        assert!(table.dispatch(Some("c.example.com")).is_none());
        assert!(table.dispatch(None).is_none());
    }

    #[tokio::test]
    async fn test_host_match_is_exact() {
        let file = write_file(ONE_SITE);
        let store = ConfigStore::from_file(file.path(), memory_backends())
            .await
            .unwrap();
        let table = store.current_route_table();
        assert!(table.dispatch(Some("a.example.com:8080")).is_none());
        assert!(table.dispatch(Some("sub.a.example.com")).is_none());
        assert!(table.dispatch(Some("A.EXAMPLE.COM")).is_none());
    }

    #[tokio::test]
    async fn test_invalid_file_fails_construction() {
        let file = write_file("- host: [broken");
        let err = ConfigStore::from_file(file.path(), memory_backends())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[tokio::test]
    async fn test_missing_file_fails_construction() {
        let dir = tempfile::tempdir().unwrap();
        let result = ConfigStore::from_file(dir.path().join("sites.yaml"), memory_backends()).await;
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[tokio::test]
    async fn test_reload_publishes_new_table() {
        let file = write_file(ONE_SITE);
        let store = ConfigStore::from_file(file.path(), memory_backends())
            .await
            .unwrap();
        assert_eq!(store.current_route_table().len(), 1);

        overwrite(file.path(), TWO_SITES);
        store.reload().await.unwrap();
        assert_eq!(store.current_route_table().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_table() {
        let file = write_file(TWO_SITES);
        let store = ConfigStore::from_file(file.path(), memory_backends())
            .await
            .unwrap();

        overwrite(file.path(), "- host: b.example.com\n  awsKey: k\n");
        let err = store.reload().await.unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSite { index: 0, .. }));
        assert_eq!(store.current_route_table().len(), 2);

        overwrite(file.path(), ONE_SITE);
        store.reload().await.unwrap();
        let table = store.current_route_table();
        assert_eq!(table.len(), 1);
        assert!(table.dispatch(Some("b.example.com")).is_none());
    }

    #[tokio::test]
    async fn test_snapshot_survives_swap() {
        let file = write_file(TWO_SITES);
        let store = ConfigStore::from_file(file.path(), memory_backends())
            .await
            .unwrap();
        let before = store.current_route_table();

        overwrite(file.path(), ONE_SITE);
        store.reload().await.unwrap();

        assert!(before.dispatch(Some("b.example.com")).is_some());
        assert!(store
            .current_route_table()
            .dispatch(Some("b.example.com"))
            .is_none());
    }

    #[tokio::test]
    async fn test_legacy_store_serves_every_host() {
        let site = Site {
            aws_key: "k".into(),
            aws_secret: "s".into(),
            aws_region: "us-east-1".into(),
            aws_bucket: "legacy".into(),
            ..Site::default()
        };
        let store = ConfigStore::from_site(&site, memory_backends()).await;
        let table = store.current_route_table();
        assert!(table.dispatch(Some("anything.example.com")).is_some());
        assert!(table.dispatch(None).is_some());
        assert!(store.source_path().is_none());
        store.reload().await.unwrap();
    }

    #[tokio::test]
    async fn test_hosts_lists_configured_sites() {
        let file = write_file(TWO_SITES);
        let store = ConfigStore::from_file(file.path(), memory_backends())
            .await
            .unwrap();
        let table = store.current_route_table();
        let mut hosts: Vec<&str> = table.hosts().collect();
        hosts.sort_unstable();
        assert_eq!(hosts, ["a.example.com", "b.example.com"]);
    }
}
