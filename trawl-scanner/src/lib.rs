pub mod crawler;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod link;
pub mod page;
pub mod site_map;

pub use crawler::{CrawlEngine, CrawlOutcome, CrawlStats, ProgressCallback, crawl};
pub use error::{LinkError, ScanError};
pub use extract::{Discarded, Extraction, HtmlScanner, LinkExtractor, LinkScanner};
pub use fetch::{Fetched, Fetcher, HttpFetcher};
pub use link::{Link, Scheme};
pub use page::Page;
pub use site_map::SiteMap;
