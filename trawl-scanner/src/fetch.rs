use crate::error::{Result, ScanError};
use crate::link::Link;
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// A successful response: where it ended up after redirects, and its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    /// Final URL, which relative hrefs in `body` resolve against.
    pub url: String,
    pub body: String,
}

impl Fetched {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
        }
    }
}

/// Retrieves the body behind a link.
///
/// No caching and no retries: one call is one request.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, link: &Link) -> impl Future<Output = Result<Fetched>> + Send;
}

/// Fetches pages over HTTP(S) with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Self::with_timeout(10)
    }

    pub fn with_timeout(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("Trawl/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs.div_ceil(2)))
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, link: &Link) -> Result<Fetched> {
        let url = Url::parse(link.url())
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", link, e)))?;

        debug!("Fetching {}", url);
        let response = self.client.get(url).send().await?;

        let status = response.status();
        let final_url = response.url().to_string();
        if final_url != link.url() {
            debug!("{} redirected to {}", link, final_url);
        }
        if !status.is_success() {
            return Err(ScanError::HttpStatus {
                url: link.url().to_string(),
                status: status.as_u16(),
            });
        }

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("text/html") || ct.contains("application/xhtml"))
            .unwrap_or(true);

        if !is_html {
            debug!("Skipping body of non-HTML page {}", link);
            return Ok(Fetched::new(final_url, String::new()));
        }

        Ok(Fetched::new(final_url, response.text().await?))
    }
}
