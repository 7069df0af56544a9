use crate::error::Result;
use crate::extract::{LinkExtractor, LinkScanner};
use crate::fetch::{Fetched, Fetcher, HttpFetcher};
use crate::link::Link;
use crate::page::Page;
use crate::site_map::SiteMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;

/// Where a crawl is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CrawlState {
    Idle,
    Seeded,
    Expanding { round: usize },
    Done,
}

impl CrawlState {
    /// Rounds only move forward one at a time, and any state may finish.
    fn can_advance_to(self, next: CrawlState) -> bool {
        match (self, next) {
            (CrawlState::Done, _) => false,
            (_, CrawlState::Done) => true,
            (CrawlState::Idle, CrawlState::Seeded) => true,
            (CrawlState::Seeded, CrawlState::Expanding { round }) => round == 1,
            (CrawlState::Expanding { round: from }, CrawlState::Expanding { round: to }) => {
                to == from + 1
            }
            _ => false,
        }
    }
}

/// Counters collected over one crawl.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStats {
    /// Expansion rounds after the seed page.
    pub rounds: usize,
    pub pages_fetched: usize,
    pub fetch_failures: usize,
    pub discarded_hrefs: usize,
    pub off_domain_links: usize,
    /// The deadline passed before the frontier emptied.
    pub cancelled: bool,
    /// The depth limit stopped expansion with links still queued.
    pub depth_limited: bool,
}

#[derive(Debug)]
pub struct CrawlOutcome {
    pub site_map: SiteMap,
    pub stats: CrawlStats,
}

/// Breadth-first crawler confined to the seed's host.
///
/// The crawl runs in rounds: every link in the frontier is fetched (up to
/// `workers` at a time) and the links they discover form the next
/// frontier, which only starts once the whole round has finished. A link
/// is queued at most once per crawl, so it is fetched at most once.
pub struct CrawlEngine<F: Fetcher> {
    seed: Link,
    fetcher: F,
    extractor: LinkExtractor,
    workers: usize,
    max_depth: Option<usize>,
    deadline: Option<Duration>,
    progress_callback: Option<ProgressCallback>,
}

impl<F: Fetcher> CrawlEngine<F> {
    pub fn new(seed: Link, fetcher: F) -> Self {
        Self {
            seed,
            fetcher,
            extractor: LinkExtractor::default(),
            workers: 10,
            max_depth: None,
            deadline: None,
            progress_callback: None,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Stop after pages `depth` hops from the seed. `None` crawls everything.
    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    /// Give up after `deadline`, returning whatever has been mapped so far.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_scanner<S: LinkScanner>(mut self, scanner: S) -> Self {
        self.extractor = LinkExtractor::new(scanner);
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub async fn run(self) -> Result<CrawlOutcome> {
        let CrawlEngine {
            seed,
            fetcher,
            extractor,
            workers,
            max_depth,
            deadline,
            progress_callback,
        } = self;
        let mut state = CrawlState::Idle;

        info!("Starting crawl of {} with {} workers", seed, workers);

        let round = Arc::new(Round {
            seed: seed.clone(),
            fetcher,
            extractor,
            progress_callback,
            deadline: deadline.map(|d| Instant::now() + d),
            ledger: Mutex::new(Ledger::new(seed.clone())),
        });

        Round::run(&round, vec![seed.clone()], workers).await?;
        let mut frontier = round.ledger.lock().await.take_frontier();

        if round.ledger.lock().await.site_map.is_empty() {
            warn!("Seed page {} could not be fetched", seed);
        } else {
            transition(&mut state, CrawlState::Seeded);
        }

        let mut rounds = 0;
        let mut cancelled = round.cut_short(&frontier).await;
        let mut depth_limited = false;

        while !frontier.is_empty() && !cancelled {
            if max_depth.is_some_and(|max| rounds >= max) {
                info!(
                    "Depth limit reached with {} links still queued",
                    frontier.len()
                );
                depth_limited = true;
                break;
            }

            rounds += 1;
            transition(&mut state, CrawlState::Expanding { round: rounds });
            info!("Round {}: {} links to visit", rounds, frontier.len());

            Round::run(&round, frontier, workers).await?;
            frontier = round.ledger.lock().await.take_frontier();
            cancelled = round.cut_short(&frontier).await;
        }

        if cancelled {
            warn!("Deadline reached, returning partial site map");
        }
        transition(&mut state, CrawlState::Done);

        let ledger = std::mem::replace(
            &mut *round.ledger.lock().await,
            Ledger::new(seed.clone()),
        );

        let mut stats = ledger.stats;
        stats.rounds = rounds;
        stats.cancelled = cancelled;
        stats.depth_limited = depth_limited;

        info!(
            "Crawl complete. Visited {} pages in {} rounds",
            ledger.site_map.len(),
            rounds
        );

        Ok(CrawlOutcome {
            site_map: ledger.site_map,
            stats,
        })
    }
}

fn transition(state: &mut CrawlState, next: CrawlState) {
    debug_assert!(
        state.can_advance_to(next),
        "illegal crawl state change {:?} -> {:?}",
        state,
        next
    );
    debug!("Crawl state {:?} -> {:?}", state, next);
    *state = next;
}

/// Crawl `seed`'s host over HTTP with default settings.
pub async fn crawl(seed: &str) -> Result<SiteMap> {
    let seed = Link::seed(seed)?;
    let engine = CrawlEngine::new(seed, HttpFetcher::new()?);
    Ok(engine.run().await?.site_map)
}

/// Shared mutable crawl state. Guarded by one lock so that recording a page
/// and queueing its links happen together.
struct Ledger {
    site_map: SiteMap,
    /// Every link ever queued, fetched or not.
    discovered: HashSet<Link>,
    next_frontier: Vec<Link>,
    /// A link was dropped unvisited because the deadline passed.
    abandoned: bool,
    stats: CrawlStats,
}

impl Ledger {
    fn new(seed: Link) -> Self {
        let mut discovered = HashSet::new();
        discovered.insert(seed);
        Self {
            site_map: SiteMap::new(),
            discovered,
            next_frontier: Vec::new(),
            abandoned: false,
            stats: CrawlStats::default(),
        }
    }

    fn take_frontier(&mut self) -> Vec<Link> {
        std::mem::take(&mut self.next_frontier)
    }

    /// Record a fetched page and queue its unseen in-domain links.
    fn record(&mut self, seed: &Link, page: Page) {
        // a redirect target counts as discovered so it is not fetched again
        self.discovered.insert(page.link.clone());

        for link in &page.out_links {
            if !link.in_domain_of(seed) {
                self.stats.off_domain_links += 1;
                continue;
            }
            if self.site_map.link_already_visited(link) {
                continue;
            }
            if self.discovered.insert(link.clone()) {
                debug!("Queuing {}", link);
                self.next_frontier.push(link.clone());
            }
        }

        if self.site_map.try_add_page(page) {
            self.stats.pages_fetched += 1;
        }
    }
}

/// Everything a worker needs while processing one round.
struct Round<F: Fetcher> {
    seed: Link,
    fetcher: F,
    extractor: LinkExtractor,
    progress_callback: Option<ProgressCallback>,
    deadline: Option<Instant>,
    ledger: Mutex<Ledger>,
}

impl<F: Fetcher> Round<F> {
    async fn run(this: &Arc<Self>, work: Vec<Link>, workers: usize) -> Result<()> {
        let worker_count = workers.min(work.len());
        let queue = Arc::new(Mutex::new(VecDeque::from(work)));

        let mut worker_handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let round = this.clone();
            let queue = queue.clone();

            let handle = tokio::spawn(async move {
                debug!("Worker {} started", worker_id);
                loop {
                    let Some(link) = queue.lock().await.pop_front() else {
                        break;
                    };
                    if round.deadline_passed() {
                        round.ledger.lock().await.abandoned = true;
                        break;
                    }
                    round.visit(worker_id, link).await;
                }
                debug!("Worker {} finished", worker_id);
            });
            worker_handles.push(handle);
        }

        // Wait for every worker before reporting a failure so none is left
        // running against the ledger.
        let mut first_error = None;
        for joined in join_all(worker_handles).await {
            if let Err(e) = joined {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Whether the deadline stopped the crawl with work left undone.
    async fn cut_short(&self, frontier: &[Link]) -> bool {
        let abandoned = self.ledger.lock().await.abandoned;
        abandoned || (!frontier.is_empty() && self.deadline_passed())
    }

    async fn visit(&self, worker_id: usize, link: Link) {
        if let Some(ref callback) = self.progress_callback {
            callback(worker_id, link.url().to_string());
        }
        info!("Fetching: {}", link);

        let fetched = match self.deadline {
            Some(deadline) => match timeout_at(deadline, self.fetcher.fetch(&link)).await {
                Ok(fetched) => fetched,
                Err(_) => {
                    debug!("Deadline hit while fetching {}", link);
                    self.ledger.lock().await.abandoned = true;
                    return;
                }
            },
            None => self.fetcher.fetch(&link).await,
        };

        let Fetched { url, body } = match fetched {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!("Fetch failed for {}: {}", link, e);
                self.ledger.lock().await.stats.fetch_failures += 1;
                return;
            }
        };

        // Hrefs resolve against where the response came from, not where we asked.
        let landed = match link.resolve(&url) {
            Ok(landed) => landed,
            Err(e) => {
                warn!("Fetch of {} ended at unusable URL {}: {}", link, url, e);
                self.ledger.lock().await.stats.fetch_failures += 1;
                return;
            }
        };
        if !landed.in_domain_of(&self.seed) {
            warn!("{} redirected off the crawled host to {}", link, landed);
            self.ledger.lock().await.stats.off_domain_links += 1;
            return;
        }

        let (page, discarded) = Page::from_body(landed, &body, &self.extractor);

        let mut ledger = self.ledger.lock().await;
        ledger.stats.discarded_hrefs += discarded.len();
        ledger.record(&self.seed, page);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanError;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SITE: &str = "http://www.example.com";

    /// In-memory site: path -> body. Unknown paths answer 404 and
    /// `/panic` makes the fetch panic.
    #[derive(Clone, Default)]
    struct StaticSite {
        pages: Arc<HashMap<String, String>>,
        /// path -> absolute URL the request ends up at
        redirects: Arc<HashMap<String, String>>,
        fetched: Arc<StdMutex<Vec<String>>>,
        delay: Option<Duration>,
    }

    impl StaticSite {
        fn new(pages: Vec<(String, String)>) -> Self {
            Self {
                pages: Arc::new(pages.into_iter().collect()),
                ..Default::default()
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn with_redirect(mut self, from: &str, to: &str) -> Self {
            Arc::make_mut(&mut self.redirects).insert(from.to_string(), to.to_string());
            self
        }

        fn fetched(&self) -> Vec<String> {
            self.fetched.lock().unwrap().clone()
        }
    }

    impl Fetcher for StaticSite {
        async fn fetch(&self, link: &Link) -> Result<Fetched> {
            assert_eq!(link.domain(), "www.example.com", "fetched off-domain {}", link);
            assert_ne!(link.path(), "/panic", "fetcher blew up");
            self.fetched.lock().unwrap().push(link.path().to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let landed = match self.redirects.get(link.path()) {
                Some(target) => Link::parse(target, target)?,
                None => link.clone(),
            };
            let body = self
                .pages
                .get(landed.path())
                .cloned()
                .ok_or_else(|| ScanError::HttpStatus {
                    url: landed.url().to_string(),
                    status: 404,
                })?;

            Ok(Fetched::new(landed.url(), body))
        }
    }

    fn anchors(hrefs: &[&str]) -> String {
        hrefs
            .iter()
            .map(|href| format!(r#"<a href="{}">link</a>"#, href))
            .collect()
    }

    /// A page at `path` whose body links to `hrefs`.
    fn page(path: &str, hrefs: &[&str]) -> (String, String) {
        (path.to_string(), anchors(hrefs))
    }

    fn engine(site: &StaticSite) -> CrawlEngine<StaticSite> {
        CrawlEngine::new(Link::seed(SITE).unwrap(), site.clone())
    }

    fn visited_paths(site_map: &SiteMap) -> Vec<String> {
        let mut paths: Vec<String> = site_map
            .all_pages()
            .map(|p| p.link.path().to_string())
            .collect();
        paths.sort();
        paths
    }

    #[test]
    fn test_crawl_state_only_moves_forward() {
        use CrawlState::*;

        assert!(Idle.can_advance_to(Seeded));
        assert!(Idle.can_advance_to(Done));
        assert!(Seeded.can_advance_to(Expanding { round: 1 }));
        assert!(Seeded.can_advance_to(Done));
        assert!(Expanding { round: 1 }.can_advance_to(Expanding { round: 2 }));
        assert!(Expanding { round: 3 }.can_advance_to(Done));

        assert!(!Idle.can_advance_to(Expanding { round: 1 }));
        assert!(!Seeded.can_advance_to(Expanding { round: 2 }));
        assert!(!Expanding { round: 2 }.can_advance_to(Expanding { round: 2 }));
        assert!(!Expanding { round: 2 }.can_advance_to(Seeded));
        assert!(!Done.can_advance_to(Idle));
        assert!(!Done.can_advance_to(Done));
    }

    #[tokio::test]
    async fn test_redirected_page_resolves_against_final_url() {
        let site = StaticSite::new(vec![
            page("/", &["/docs"]),
            page("/docs/", &["intro.html"]),
            page("/docs/intro.html", &["/docs"]),
        ])
        .with_redirect("/docs", "http://www.example.com/docs/");

        let outcome = engine(&site).run().await.unwrap();

        assert_eq!(
            visited_paths(&outcome.site_map),
            vec!["/", "/docs/", "/docs/intro.html"]
        );
        assert_eq!(site.fetched(), vec!["/", "/docs", "/docs/intro.html"]);
    }

    #[tokio::test]
    async fn test_redirect_off_the_host_is_dropped() {
        let site = StaticSite::new(vec![
            page("/", &["/away"]),
            page("/elsewhere/", &["/never.html"]),
        ])
        .with_redirect("/away", "http://cdn.example.net/elsewhere/");

        let outcome = engine(&site).run().await.unwrap();

        assert_eq!(visited_paths(&outcome.site_map), vec!["/"]);
        assert_eq!(outcome.stats.off_domain_links, 1);
        assert!(!site.fetched().contains(&"/never.html".to_string()));
    }

    #[tokio::test]
    async fn test_worker_panic_is_reported_after_siblings_finish() {
        let site = StaticSite::new(vec![
            page("/", &["/panic", "/a.html", "/b.html"]),
            page("/a.html", &[]),
            page("/b.html", &[]),
        ])
        .with_delay(Duration::from_millis(20));

        let result = engine(&site).with_workers(3).run().await;

        assert!(matches!(result, Err(ScanError::JoinError(_))));
        let fetched = site.fetched();
        assert!(fetched.contains(&"/a.html".to_string()));
        assert!(fetched.contains(&"/b.html".to_string()));
    }

    #[tokio::test]
    async fn test_maps_every_reachable_page_once() {
        let site = StaticSite::new(vec![
            page("/", &["/a.html", "b/", "https://www.example.com/a.html"]),
            page("/a.html", &["/", "b/index.html", "#top", "a.html?x=1"]),
            page("/b/", &["index.html", "../a.html", "c.html"]),
            page("/b/index.html", &["../", "./c.html"]),
            page("/b/c.html", &["/b/c.html", "http://www.example.com:8080/"]),
        ]);

        let outcome = engine(&site).run().await.unwrap();

        assert_eq!(
            visited_paths(&outcome.site_map),
            vec!["/", "/a.html", "/b/", "/b/c.html", "/b/index.html"]
        );

        let mut fetched = site.fetched();
        let total = fetched.len();
        fetched.sort();
        fetched.dedup();
        assert_eq!(total, fetched.len(), "a page was fetched twice");
        assert_eq!(outcome.stats.pages_fetched, 5);
        assert_eq!(outcome.stats.fetch_failures, 0);
    }

    #[tokio::test]
    async fn test_never_leaves_the_seed_host() {
        let site = StaticSite::new(vec![
            page(
                "/",
                &[
                    "http://example.com/",
                    "http://blog.www.example.com/",
                    "https://www.example.net/",
                    "/inside.html",
                ],
            ),
            page("/inside.html", &[]),
        ]);

        let outcome = engine(&site).run().await.unwrap();

        assert_eq!(visited_paths(&outcome.site_map), vec!["/", "/inside.html"]);
        assert_eq!(outcome.stats.off_domain_links, 3);
        let seed_page = outcome
            .site_map
            .page_for_link(&Link::seed(SITE).unwrap())
            .unwrap();
        assert_eq!(seed_page.out_links.len(), 4);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_skipped_and_not_retried() {
        let site = StaticSite::new(vec![
            page("/", &["/missing.html", "/ok.html"]),
            page("/ok.html", &["/missing.html", "/deeper.html"]),
            page("/deeper.html", &["/missing.html"]),
        ]);

        let outcome = engine(&site).run().await.unwrap();

        assert_eq!(
            visited_paths(&outcome.site_map),
            vec!["/", "/deeper.html", "/ok.html"]
        );
        assert!(
            !outcome
                .site_map
                .link_already_visited(&Link::parse(SITE, "/missing.html").unwrap())
        );
        let missing_fetches = site
            .fetched()
            .iter()
            .filter(|p| p.as_str() == "/missing.html")
            .count();
        assert_eq!(missing_fetches, 1);
        assert_eq!(outcome.stats.fetch_failures, 1);
    }

    #[tokio::test]
    async fn test_seed_failure_returns_empty_map() {
        let site = StaticSite::default();

        let outcome = engine(&site).run().await.unwrap();

        assert!(outcome.site_map.is_empty());
        assert_eq!(outcome.stats.rounds, 0);
        assert_eq!(outcome.stats.fetch_failures, 1);
    }

    #[tokio::test]
    async fn test_discarded_hrefs_are_counted() {
        let site = StaticSite::new(vec![page(
            "/",
            &["ftp://www.example.com/", "../escape.html", "mailto:me@example.com"],
        )]);

        let outcome = engine(&site).run().await.unwrap();

        assert_eq!(outcome.site_map.len(), 1);
        assert_eq!(outcome.stats.discarded_hrefs, 3);
    }

    #[tokio::test]
    async fn test_breadth_first_rounds() {
        let site = StaticSite::new(vec![
            page("/", &["/1a", "/1b", "/1c"]),
            page("/1a", &["/2a"]),
            page("/1b", &["/2b", "/1c"]),
            page("/1c", &["/2c"]),
            page("/2a", &["/3a"]),
            page("/2b", &[]),
            page("/2c", &[]),
            page("/3a", &[]),
        ]);

        let outcome = engine(&site).with_workers(3).run().await.unwrap();
        assert_eq!(outcome.stats.rounds, 3);

        let fetched = site.fetched();
        let position = |path: &str| fetched.iter().position(|p| p == path).unwrap();
        for shallow in ["/1a", "/1b", "/1c"] {
            for deep in ["/2a", "/2b", "/2c"] {
                assert!(position(shallow) < position(deep));
            }
        }
        assert!(position("/2a") < position("/3a"));
    }

    #[tokio::test]
    async fn test_max_depth_stops_expansion() {
        let site = StaticSite::new(vec![
            page("/", &["/one.html"]),
            page("/one.html", &["/two.html"]),
            page("/two.html", &[]),
        ]);

        let outcome = engine(&site).with_max_depth(Some(1)).run().await.unwrap();

        assert_eq!(visited_paths(&outcome.site_map), vec!["/", "/one.html"]);
        assert!(outcome.stats.depth_limited);
        assert!(!site.fetched().contains(&"/two.html".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_returns_partial_map() {
        let site = StaticSite::new(vec![
            page("/", &["/slow.html"]),
            page("/slow.html", &["/never.html"]),
            page("/never.html", &[]),
        ])
        .with_delay(Duration::from_secs(10));

        let outcome = engine(&site)
            .with_deadline(Duration::from_secs(15))
            .run()
            .await
            .unwrap();

        assert_eq!(visited_paths(&outcome.site_map), vec!["/"]);
        assert!(outcome.stats.cancelled);
        assert!(!site.fetched().contains(&"/never.html".to_string()));
    }

    fn expired_round() -> Round<StaticSite> {
        let seed = Link::seed(SITE).unwrap();
        Round {
            seed: seed.clone(),
            fetcher: StaticSite::default(),
            extractor: LinkExtractor::default(),
            progress_callback: None,
            deadline: Some(Instant::now()),
            ledger: Mutex::new(Ledger::new(seed)),
        }
    }

    #[tokio::test]
    async fn test_expired_deadline_with_nothing_left_is_not_a_partial_crawl() {
        let round = expired_round();
        assert!(round.deadline_passed());

        assert!(!round.cut_short(&[]).await);
        assert!(
            round
                .cut_short(&[Link::parse(SITE, "/queued.html").unwrap()])
                .await
        );

        round.ledger.lock().await.abandoned = true;
        assert!(round.cut_short(&[]).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_workers_fetch_each_page_once() {
        let leaves: Vec<String> = (0..40).map(|i| format!("/p{}.html", i)).collect();
        let mut hrefs: Vec<&str> = leaves.iter().map(String::as_str).collect();

        let mut pages = vec![page("/", &hrefs)];
        // every leaf links to every other leaf and back home
        hrefs.push("/");
        for leaf in &leaves {
            pages.push(page(leaf, &hrefs));
        }
        let site = StaticSite::new(pages).with_delay(Duration::from_millis(5));

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let outcome = engine(&site)
            .with_workers(8)
            .with_progress_callback(Arc::new(move |_worker_id, _url| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }))
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.site_map.len(), 41);
        assert_eq!(site.fetched().len(), 41);
        assert_eq!(calls.load(Ordering::SeqCst), 41);
        assert_eq!(outcome.stats.rounds, 1);
    }

    /// Treats every whitespace separated word of the body as an href.
    struct WordScanner;

    impl LinkScanner for WordScanner {
        fn extract(&self, _base_url: &str, body: &str) -> Vec<String> {
            body.split_whitespace().map(str::to_string).collect()
        }
    }

    #[tokio::test]
    async fn test_custom_scanner() {
        let site = StaticSite::new(vec![
            ("/".to_string(), "/x /y".to_string()),
            ("/x".to_string(), "y".to_string()),
            ("/y".to_string(), String::new()),
        ]);

        let outcome = engine(&site).with_scanner(WordScanner).run().await.unwrap();

        assert_eq!(visited_paths(&outcome.site_map), vec!["/", "/x", "/y"]);
    }
}
