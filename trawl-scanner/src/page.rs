use crate::extract::{Discarded, LinkExtractor};
use crate::link::Link;
use std::collections::HashSet;

/// A fetched page and the anchors it links out to.
#[derive(Debug, Clone)]
pub struct Page {
    pub link: Link,
    /// Document order, duplicates kept.
    pub out_links: Vec<Link>,
}

impl Page {
    pub fn new(link: Link, out_links: Vec<Link>) -> Self {
        Self { link, out_links }
    }

    /// Build a page from its body. Hrefs that are not valid links are
    /// handed back instead of becoming out-links.
    pub fn from_body(link: Link, body: &str, extractor: &LinkExtractor) -> (Self, Vec<Discarded>) {
        let extraction = extractor.extract(&link, body);
        (Self::new(link, extraction.links), extraction.discarded)
    }

    /// Out-links with equivalent links collapsed, first occurrence wins.
    pub fn unique_out_links(&self) -> Vec<&Link> {
        let mut seen = HashSet::new();
        self.out_links
            .iter()
            .filter(|link| seen.insert(link.key()))
            .collect()
    }
}
