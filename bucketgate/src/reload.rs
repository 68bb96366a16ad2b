//! Background reload of the site configuration
//!
//! A [`ChangeSource`] reports that the configuration may have changed; the
//! [`ReloadWatcher`] coalesces bursts of reports and asks the store to
//! rebuild and publish a new route table.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

use crate::store::ConfigStore;

/// Producer of configuration change notifications
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Wait for the next change, `None` once the source is closed
    async fn next_change(&mut self) -> Option<()>;
}

/// Size and modification time of the watched file
type FileStamp = (SystemTime, u64);

/// Polls a file's metadata at a fixed interval
pub struct PollingSource {
    path: PathBuf,
    interval: Duration,
    last: Option<FileStamp>,
}

impl PollingSource {
    /// Start watching; the current state of the file is the baseline
    pub async fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        let path = path.into();
        let last = stamp(&path).await;
        Self {
            path,
            interval,
            last,
        }
    }
}

async fn stamp(path: &std::path::Path) -> Option<FileStamp> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    Some((metadata.modified().ok()?, metadata.len()))
}

#[async_trait]
impl ChangeSource for PollingSource {
    async fn next_change(&mut self) -> Option<()> {
        loop {
            tokio::time::sleep(self.interval).await;

            // A missing file is not a change; the last good table stays.
            let Some(current) = stamp(&self.path).await else {
                continue;
            };
            if self.last != Some(current) {
                self.last = Some(current);
                return Some(());
            }
        }
    }
}

#[async_trait]
impl ChangeSource for mpsc::Receiver<()> {
    async fn next_change(&mut self) -> Option<()> {
        self.recv().await
    }
}

/// Drives reloads of a [`ConfigStore`] from a change source
pub struct ReloadWatcher {
    store: Arc<ConfigStore>,
    source: Box<dyn ChangeSource>,
    debounce: Duration,
}

impl ReloadWatcher {
    pub fn new(store: Arc<ConfigStore>, source: Box<dyn ChangeSource>, debounce: Duration) -> Self {
        Self {
            store,
            source,
            debounce,
        }
    }

    /// Run until shutdown is signalled or the source closes
    pub async fn run(mut self, shutdown: Arc<Notify>) {
        info!(debounce = ?self.debounce, "Config watcher started");

        loop {
            tokio::select! {
                change = self.source.next_change() => {
                    if change.is_none() {
                        debug!("Change source closed");
                        break;
                    }
                    let closed = self.settle().await;
                    self.reload().await;
                    if closed {
                        break;
                    }
                }
                () = shutdown.notified() => {
                    info!("Config watcher shutting down");
                    break;
                }
            }
        }
    }

    /// Wait for a quiet period with no further changes.
    ///
    /// Returns true if the source closed while waiting.
    async fn settle(&mut self) -> bool {
        loop {
            match tokio::time::timeout(self.debounce, self.source.next_change()).await {
                Ok(Some(())) => debug!("Coalescing configuration change"),
                Ok(None) => return true,
                Err(_) => return false,
            }
        }
    }

    async fn reload(&self) {
        match self.store.reload().await {
            Ok(()) => info!("Configuration reloaded"),
            Err(e) => warn!(error = %e, "Configuration reload failed, keeping previous sites"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BackendFactory;
    use bucketgate_core::Site;
    use bucketgate_s3::{MemoryBackend, ObjectBackend};
    use std::io::Write;

    const SITE_A: &str = "
- host: a.example.com
  awsKey: k
  awsSecret: s
  awsRegion: us-east-1
  awsBucket: a
";

    const SITE_B: &str = "
- host: b.example.com
  awsKey: k
  awsSecret: s
  awsRegion: us-east-1
  awsBucket: b
";

    async fn store_for(contents: &str) -> (Arc<ConfigStore>, tempfile::NamedTempFile) {
        let backends: BackendFactory = Arc::new(|site: &Site| -> Arc<dyn ObjectBackend> {
            Arc::new(MemoryBackend::new(&site.aws_bucket))
        });
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        let store = ConfigStore::from_file(file.path(), backends).await.unwrap();
        (Arc::new(store), file)
    }

    fn serves(store: &ConfigStore, host: &str) -> bool {
        store.current_route_table().dispatch(Some(host)).is_some()
    }

    #[tokio::test]
    async fn test_change_triggers_reload() {
        let (store, file) = store_for(SITE_A).await;
        std::fs::write(file.path(), SITE_B).unwrap();

        let (tx, rx) = mpsc::channel(4);
        tx.send(()).await.unwrap();
        drop(tx);

        ReloadWatcher::new(Arc::clone(&store), Box::new(rx), Duration::from_millis(10))
            .run(Arc::new(Notify::new()))
            .await;

        assert!(serves(&store, "b.example.com"));
        assert!(!serves(&store, "a.example.com"));
    }

    #[tokio::test]
    async fn test_burst_of_changes_is_coalesced() {
        let (store, file) = store_for(SITE_A).await;
        std::fs::write(file.path(), SITE_B).unwrap();

        let (tx, rx) = mpsc::channel(8);
        for _ in 0..5 {
            tx.send(()).await.unwrap();
        }
        drop(tx);

        let mut watcher =
            ReloadWatcher::new(Arc::clone(&store), Box::new(rx), Duration::from_millis(10));
        assert_eq!(watcher.source.next_change().await, Some(()));
        // The rest of the burst is absorbed by a single settle
        assert!(watcher.settle().await);
        assert_eq!(watcher.source.next_change().await, None);
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_serving() {
        let (store, file) = store_for(SITE_A).await;
        std::fs::write(file.path(), "- host: [broken").unwrap();

        let (tx, rx) = mpsc::channel(4);
        tx.send(()).await.unwrap();
        drop(tx);

        ReloadWatcher::new(Arc::clone(&store), Box::new(rx), Duration::from_millis(10))
            .run(Arc::new(Notify::new()))
            .await;

        assert!(serves(&store, "a.example.com"));
    }

    #[tokio::test]
    async fn test_shutdown_stops_watcher() {
        let (store, _file) = store_for(SITE_A).await;
        let (_tx, rx) = mpsc::channel::<()>(1);
        let shutdown = Arc::new(Notify::new());

        let handle = tokio::spawn(
            ReloadWatcher::new(store, Box::new(rx), Duration::from_millis(10))
                .run(Arc::clone(&shutdown)),
        );
        shutdown.notify_one();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_spawned_polling_watcher_applies_file_edit() {
        let (store, file) = store_for(SITE_A).await;
        let source = PollingSource::new(file.path(), Duration::from_millis(10)).await;
        let shutdown = Arc::new(Notify::new());

        let handle = tokio::spawn(
            ReloadWatcher::new(Arc::clone(&store), Box::new(source), Duration::from_millis(10))
                .run(Arc::clone(&shutdown)),
        );

        std::fs::write(file.path(), format!("{SITE_A}{SITE_B}")).unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !serves(&store, "b.example.com") {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert!(serves(&store, "a.example.com"));

        shutdown.notify_one();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_polling_source_detects_modification() {
        let (_store, file) = store_for(SITE_A).await;
        let mut source = PollingSource::new(file.path(), Duration::from_millis(10)).await;

        std::fs::write(file.path(), format!("{SITE_A}{SITE_B}")).unwrap();
        let change = tokio::time::timeout(Duration::from_secs(5), source.next_change())
            .await
            .unwrap();
        assert_eq!(change, Some(()));
    }

    #[tokio::test]
    async fn test_polling_source_ignores_unchanged_and_missing_files() {
        let (_store, file) = store_for(SITE_A).await;
        let mut unchanged = PollingSource::new(file.path(), Duration::from_millis(10)).await;
        let waited = tokio::time::timeout(Duration::from_millis(100), unchanged.next_change()).await;
        assert!(waited.is_err());

        let dir = tempfile::tempdir().unwrap();
        let mut missing =
            PollingSource::new(dir.path().join("sites.yaml"), Duration::from_millis(10)).await;
        let waited = tokio::time::timeout(Duration::from_millis(100), missing.next_change()).await;
        assert!(waited.is_err());
    }
}
