//! CDN host ranking
//!
//! Resolution pings every host of a `cdns` row and ranks the ones that
//! answer by latency. Results are cached per `region|hosts`; callers that
//! arrive while a resolution is in flight wait for it instead of pinging
//! again. A failed resolution is not cached.

use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use futures::stream::{self, StreamExt};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::{ProtocolError, Result};
use crate::transport::HttpClient;

/// A host that answered a ping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedHost {
    /// Host name, optionally with port
    pub host: String,
    /// Measured round trip
    pub latency: Duration,
}

type Resolution = Arc<OnceCell<Vec<RankedHost>>>;

/// Latency-ranked CDN host resolver
#[derive(Debug, Clone)]
pub struct HostResolver {
    http: HttpClient,
    concurrency: usize,
    resolutions: Arc<DashMap<String, Resolution>>,
    failed: Arc<DashSet<String>>,
}

impl HostResolver {
    /// Create a resolver pinging at most `concurrency` hosts at once
    pub fn new(http: HttpClient, concurrency: usize) -> Self {
        Self {
            http,
            concurrency: concurrency.max(1),
            resolutions: Arc::default(),
            failed: Arc::default(),
        }
    }

    /// Responsive hosts, fastest first, with failed hosts moved last
    pub async fn ranked_hosts(&self, region: &str, hosts: &[String]) -> Result<Vec<RankedHost>> {
        let key = format!("{region}|{}", hosts.join(" "));
        let cell = Arc::clone(self.resolutions.entry(key).or_default().value());

        let ranked = cell
            .get_or_try_init(|| self.resolve(region, hosts))
            .await?
            .clone();

        let (healthy, failed): (Vec<_>, Vec<_>) = ranked
            .into_iter()
            .partition(|h| !self.failed.contains(&h.host));
        Ok(healthy.into_iter().chain(failed).collect())
    }

    /// The fastest responsive host
    pub async fn best_host(&self, region: &str, hosts: &[String]) -> Result<String> {
        self.ranked_hosts(region, hosts)
            .await?
            .into_iter()
            .next()
            .map(|h| h.host)
            .ok_or_else(|| ProtocolError::AllHostsFailed(hosts.join(" ")))
    }

    /// Demote `host` behind every healthy host
    pub fn mark_failed(&self, host: &str) {
        if self.failed.insert(host.to_string()) {
            warn!(%host, "marking CDN host as failed");
        }
    }

    async fn resolve(&self, region: &str, hosts: &[String]) -> Result<Vec<RankedHost>> {
        info!(%region, hosts = %hosts.join(" "), "resolving CDN hosts");

        let mut ranked: Vec<RankedHost> = stream::iter(hosts.iter().cloned())
            .map(|host| async move {
                match self.http.ping(&format!("http://{host}/")).await {
                    Ok(latency) => {
                        debug!(%host, latency_ms = latency.as_millis() as u64, "host resolved");
                        Some(RankedHost { host, latency })
                    }
                    Err(e) => {
                        debug!(%host, error = %e, "host failed to resolve a ping");
                        None
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .filter_map(|h| async move { h })
            .collect()
            .await;

        if ranked.is_empty() {
            return Err(ProtocolError::AllHostsFailed(hosts.join(" ")));
        }

        ranked.sort_by_key(|h| h.latency);
        info!(
            host = %ranked[0].host,
            latency_ms = ranked[0].latency.as_millis() as u64,
            "resolved fastest CDN host"
        );
        Ok(ranked)
    }
}
