//! Single background writer for process-wide state
//!
//! The keyring only raises a dirty flag when it changes. One task flushes it
//! on an interval, so a burst of changes becomes one write, and
//! [`FlushHandle::shutdown`] writes whatever is left. The cache integrity
//! ledger is written through by every store; here it is only flushed when a
//! store's write failed and left it dirty.

use std::sync::Arc;
use std::time::Duration;

use casket_cache::IntegrityManifest;
use casket_crypto::Keyring;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// State that can be persisted when dirty
pub trait Flush: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Write pending changes, returning whether anything was written
    fn flush(&self) -> Result<bool, String>;
}

impl Flush for Keyring {
    fn name(&self) -> &'static str {
        "keyring"
    }

    fn flush(&self) -> Result<bool, String> {
        Keyring::flush(self).map_err(|e| e.to_string())
    }
}

impl Flush for IntegrityManifest {
    fn name(&self) -> &'static str {
        "cache integrity"
    }

    fn flush(&self) -> Result<bool, String> {
        IntegrityManifest::flush(self).map_err(|e| e.to_string())
    }
}

fn flush_all(targets: &[Arc<dyn Flush>]) {
    for target in targets {
        match target.flush() {
            Ok(true) => debug!(target = target.name(), "persisted"),
            Ok(false) => {}
            Err(e) => warn!(target = target.name(), error = %e, "unable to persist"),
        }
    }
}

/// Handle to the flush task
#[derive(Debug)]
pub struct FlushHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl FlushHandle {
    /// Stop the task after a final flush
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = self.task.await {
            warn!(error = %e, "flush task ended abnormally");
        }
    }
}

/// Flush every target on `interval` until shut down
pub fn spawn_flush_task(interval: Duration, targets: Vec<Arc<dyn Flush>>) -> FlushHandle {
    let (stop, mut stopped) = oneshot::channel();
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => flush_all(&targets),
                _ = &mut stopped => break,
            }
        }
        flush_all(&targets);
    });

    FlushHandle {
        stop: Some(stop),
        task,
    }
}
