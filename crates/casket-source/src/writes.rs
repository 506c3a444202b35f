//! Background cache population

use bytes::Bytes;
use casket_cache::{BuildCache, CacheNamespace, ContentCache};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// Cache stores running behind the caller
///
/// Stores are detached tasks: dropping the tracker does not cancel them.
#[derive(Debug, Default)]
pub(crate) struct CacheWrites {
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CacheWrites {
    /// Store `data` without making the caller wait
    pub(crate) fn store(&self, cache: &BuildCache, namespace: CacheNamespace, key: String, data: Bytes) {
        let cache = cache.clone();
        let handle = tokio::spawn(async move {
            match cache.put(namespace, &key, data).await {
                Ok(()) => trace!(%key, "stored fetched file in cache"),
                Err(e) => warn!(%key, error = %e, "unable to store fetched file in cache"),
            }
        });

        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Wait for every store started so far
    pub(crate) async fn wait(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "cache store task failed");
            }
        }
    }
}
