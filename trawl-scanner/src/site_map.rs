use crate::link::Link;
use crate::page::Page;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// Every page visited during a crawl, keyed by its link.
#[derive(Debug, Default, Clone)]
pub struct SiteMap {
    visited: HashMap<Link, Page>,
}

impl SiteMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link_already_visited(&self, link: &Link) -> bool {
        self.visited.contains_key(link)
    }

    pub fn page_for_link(&self, link: &Link) -> Option<&Page> {
        self.visited.get(link)
    }

    /// Insert or replace the page stored under its link.
    pub fn add_page(&mut self, page: Page) {
        self.visited.insert(page.link.clone(), page);
    }

    /// Insert the page only if its link has not been visited yet.
    pub fn try_add_page(&mut self, page: Page) -> bool {
        match self.visited.entry(page.link.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(page);
                true
            }
        }
    }

    pub fn all_pages(&self) -> impl Iterator<Item = &Page> {
        self.visited.values()
    }

    pub fn len(&self) -> usize {
        self.visited.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visited.is_empty()
    }

    /// Pages ordered by URL.
    pub fn pages_by_url(&self) -> Vec<&Page> {
        let mut pages: Vec<&Page> = self.visited.values().collect();
        pages.sort_by(|a, b| a.link.url().cmp(b.link.url()));
        pages
    }
}
