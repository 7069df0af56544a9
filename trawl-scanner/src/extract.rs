use crate::error::LinkError;
use crate::link::Link;
use scraper::{Html, Selector};
use std::sync::Arc;
use tracing::debug;

/// Pulls raw href values out of a page body.
///
/// Implementations return hrefs in document order and keep duplicates.
pub trait LinkScanner: Send + Sync + 'static {
    fn extract(&self, base_url: &str, body: &str) -> Vec<String>;
}

/// Scans HTML for `<a href>` anchors.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlScanner;

impl LinkScanner for HtmlScanner {
    fn extract(&self, _base_url: &str, body: &str) -> Vec<String> {
        let document = Html::parse_document(body);
        let link_selector = Selector::parse("a[href]").unwrap();

        document
            .select(&link_selector)
            .filter_map(|element| element.value().attr("href"))
            .map(str::to_string)
            .collect()
    }
}

/// An href that could not be turned into a [`Link`].
#[derive(Debug, Clone, PartialEq)]
pub struct Discarded {
    pub href: String,
    pub reason: LinkError,
}

/// Links found on one page, split into usable links and discarded hrefs.
#[derive(Debug, Default, Clone)]
pub struct Extraction {
    pub links: Vec<Link>,
    pub discarded: Vec<Discarded>,
}

/// Turns a page body into [`Link`]s relative to the page it came from.
#[derive(Clone)]
pub struct LinkExtractor {
    scanner: Arc<dyn LinkScanner>,
}

impl LinkExtractor {
    pub fn new<S: LinkScanner>(scanner: S) -> Self {
        Self {
            scanner: Arc::new(scanner),
        }
    }

    pub fn extract(&self, base: &Link, body: &str) -> Extraction {
        let mut extraction = Extraction::default();

        for href in self.scanner.extract(base.url(), body) {
            match base.resolve(&href) {
                Ok(link) => extraction.links.push(link),
                Err(reason) => {
                    debug!("Discarding href {:?} on {}: {}", href, base, reason);
                    extraction.discarded.push(Discarded { href, reason });
                }
            }
        }

        extraction
    }
}

impl Default for LinkExtractor {
    fn default() -> Self {
        Self::new(HtmlScanner)
    }
}
