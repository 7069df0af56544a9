use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;
use trawl_scanner::{CrawlEngine, CrawlOutcome, HttpFetcher, Link, ProgressCallback};
use url::Url;

/// Options for configuring a crawl
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub seed: String,
    pub workers: usize,
    /// Rounds after the seed page; `None` crawls until the frontier is empty.
    pub max_depth: Option<usize>,
    pub deadline: Option<Duration>,
    pub timeout_secs: u64,
    pub show_progress_bars: bool,
}

impl CrawlOptions {
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            workers: 10,
            max_depth: None,
            deadline: None,
            timeout_secs: 10,
            show_progress_bars: false,
        }
    }
}

/// Callback for status lines meant for the user
pub type CrawlProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Extract the path component from a URL
pub fn extract_url_path(url: &str) -> String {
    Url::parse(url)
        .ok()
        .map(|u| {
            let path = u.path().to_string();
            if path.is_empty() { "/".to_string() } else { path }
        })
        .unwrap_or_else(|| url.to_string())
}

/// Crawl the seed's host and return the site map with its statistics.
///
/// A seed that is not a valid link is an error. Fetch failures during the
/// crawl are not: they are counted in the statistics and the crawl goes on.
pub async fn execute_crawl(
    options: CrawlOptions,
    progress_callback: Option<CrawlProgressCallback>,
) -> Result<CrawlOutcome, String> {
    let CrawlOptions {
        seed,
        workers,
        max_depth,
        deadline,
        timeout_secs,
        show_progress_bars,
    } = options;

    let seed_link =
        Link::seed(&seed).map_err(|e| format!("Invalid seed URL '{}': {}", seed, e))?;
    let fetcher = HttpFetcher::with_timeout(timeout_secs)
        .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

    let progress_bar = if show_progress_bars {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .map_err(|e| format!("Invalid progress template: {}", e))?,
        );
        pb.set_message("Starting crawl...");
        Some(Arc::new(pb))
    } else {
        None
    };

    let processed_count = Arc::new(AtomicUsize::new(0));

    let worker_progress: ProgressCallback = match progress_bar.clone() {
        Some(pb) => {
            let count = processed_count.clone();
            Arc::new(move |_worker_id: usize, url: String| {
                let n = count.fetch_add(1, Ordering::Relaxed) + 1;
                pb.set_message(format!(
                    "Crawling... {} URLs processed ({})",
                    n,
                    extract_url_path(&url)
                ));
                pb.tick();
            })
        }
        None => {
            let count = processed_count.clone();
            Arc::new(move |_worker_id: usize, _url: String| {
                count.fetch_add(1, Ordering::Relaxed);
            })
        }
    };

    if let Some(ref callback) = progress_callback {
        callback(format!("Crawling {} with {} workers", seed_link, workers));
    }

    let mut engine = CrawlEngine::new(seed_link, fetcher)
        .with_workers(workers)
        .with_max_depth(max_depth)
        .with_progress_callback(worker_progress);
    if let Some(deadline) = deadline {
        engine = engine.with_deadline(deadline);
    }

    let outcome = engine.run().await.map_err(|e| e.to_string())?;

    let total = processed_count.load(Ordering::Relaxed);
    debug!("Crawl finished after {} fetch attempts", total);

    if let Some(ref pb) = progress_bar {
        pb.finish_with_message(format!(
            "Crawl complete! {} URLs processed, {} pages mapped",
            total,
            outcome.site_map.len()
        ));
    }

    if let Some(ref callback) = progress_callback {
        if outcome.stats.cancelled {
            callback("[!]  Deadline reached, the site map is partial".to_string());
        } else if outcome.stats.depth_limited {
            callback("[!]  Depth limit reached, links were left unvisited".to_string());
        }
    }

    Ok(outcome)
}
