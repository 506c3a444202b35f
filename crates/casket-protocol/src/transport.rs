//! HTTP transport shared by every protocol client

use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::header::RANGE;
use reqwest::{Client, ClientBuilder, Response};
use tracing::{debug, trace};

use crate::config::ProtocolConfig;
use crate::error::{ProtocolError, Result};

/// HTTP client with the configured timeouts
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    ping_timeout: Duration,
}

impl HttpClient {
    /// Build a client from `config`
    pub fn new(config: &ProtocolConfig) -> Result<Self> {
        // reqwest is built without a default rustls provider
        let _ = rustls::crypto::ring::default_provider().install_default();

        let client = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(30))
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .tcp_nodelay(true)
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .redirect(reqwest::redirect::Policy::limited(3))
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self {
            client,
            ping_timeout: config.ping_timeout,
        })
    }

    fn check(url: &str, response: Response) -> Result<Response> {
        let status = response.status();
        trace!(%url, status = status.as_u16(), "response");
        if status.is_success() {
            Ok(response)
        } else {
            Err(ProtocolError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            })
        }
    }

    /// Fetch a whole resource
    pub async fn get(&self, url: &str) -> Result<Bytes> {
        debug!(%url, "GET");
        let response = self.client.get(url).send().await?;
        Ok(Self::check(url, response)?.bytes().await?)
    }

    /// Fetch a resource as UTF-8 text
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let body = self.get(url).await?;
        Ok(String::from_utf8(body.to_vec())?)
    }

    /// Fetch `len` bytes at `offset`
    pub async fn get_range(&self, url: &str, offset: u64, len: u64) -> Result<Bytes> {
        let end = offset + len.saturating_sub(1);
        debug!(%url, offset, len, "GET range");
        let response = self
            .client
            .get(url)
            .header(RANGE, format!("bytes={offset}-{end}"))
            .send()
            .await?;
        Ok(Self::check(url, response)?.bytes().await?)
    }

    /// Round trip time of one request to `url`
    ///
    /// Any completed response counts; only transport failures are errors.
    pub async fn ping(&self, url: &str) -> Result<Duration> {
        let start = Instant::now();
        self.client
            .get(url)
            .timeout(self.ping_timeout)
            .send()
            .await?;
        Ok(start.elapsed())
    }
}
