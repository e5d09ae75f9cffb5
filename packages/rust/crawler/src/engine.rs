//! Concurrent crawl engine.
//!
//! A fixed pool of workers pulls URLs from a shared [`Frontier`], fetches
//! them through the configured [`FetchStrategy`], and streams successful
//! pages to the caller while the crawl is still running. A page budget caps
//! successful fetches; per-URL failures are retried with backoff and
//! recorded, never fatal.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use scraper::{Html, Selector};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use url::Url;

use rivalmap_shared::{Page, Result, RivalmapError, RunConfig, UrlRecord};

use crate::fetch::{FetchError, FetchStrategy, FetchedContent, build_fetcher};
use crate::frontier::{Dequeue, EnqueueOutcome, Frontier};

// ---------------------------------------------------------------------------
// CrawlOutcome
// ---------------------------------------------------------------------------

/// Summary of a completed (or cancelled) crawl.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    /// Pages fetched successfully and streamed to the caller.
    pub pages_fetched: usize,
    /// URLs that exhausted their fetch attempts (URL, final error).
    pub failed: Vec<(String, String)>,
    /// Links dropped because their normalized form was already known.
    pub duplicate_links: usize,
    /// Links dropped for pointing outside the crawl scope.
    pub offsite_links: usize,
    /// Links dropped for not being parseable URLs.
    pub invalid_links: usize,
    /// Every URL considered, in discovery order.
    pub url_records: Vec<UrlRecord>,
    /// Wall-clock duration of the crawl.
    pub duration: Duration,
    /// True when the crawl stopped on a cancellation signal.
    pub cancelled: bool,
}

// ---------------------------------------------------------------------------
// Budget gate
// ---------------------------------------------------------------------------

/// Reservation counter enforcing the page budget.
///
/// Workers reserve a slot before fetching and release it when the fetch
/// fails, so successful pages never exceed the budget.
struct BudgetGate {
    budget: usize,
    reserved: AtomicUsize,
}

impl BudgetGate {
    fn new(budget: usize) -> Self {
        Self {
            budget,
            reserved: AtomicUsize::new(0),
        }
    }

    fn try_reserve(&self) -> bool {
        self.reserved
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current < self.budget).then_some(current + 1)
            })
            .is_ok()
    }

    fn release(&self) {
        self.reserved.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Crawler
// ---------------------------------------------------------------------------

/// Concurrent, budgeted, domain-scoped crawler.
pub struct Crawler {
    config: RunConfig,
    fetcher: Arc<dyn FetchStrategy>,
}

impl Crawler {
    /// Create a crawler with the fetch strategy the config selects.
    pub fn new(config: RunConfig) -> Result<Self> {
        let fetcher = build_fetcher(&config)?;
        Ok(Self { config, fetcher })
    }

    /// Create a crawler with an explicit fetch strategy.
    pub fn with_fetcher(config: RunConfig, fetcher: Arc<dyn FetchStrategy>) -> Self {
        Self { config, fetcher }
    }

    /// Crawl from `seed`, streaming each fetched page into `pages`.
    ///
    /// Runs until the frontier is exhausted, the page budget is spent, or
    /// `cancel` is raised. In-flight fetches finish before this returns.
    #[instrument(skip_all, fields(seed = %seed))]
    pub async fn run(
        &self,
        seed: &Url,
        pages: mpsc::Sender<Page>,
        cancel: Arc<AtomicBool>,
    ) -> Result<CrawlOutcome> {
        let started = std::time::Instant::now();

        let frontier = Arc::new(Frontier::new(seed, &self.config)?);
        match frontier.enqueue(seed.as_str(), None, 0).await {
            EnqueueOutcome::Added => {}
            outcome => {
                return Err(RivalmapError::config(format!(
                    "seed URL {seed} was not accepted for crawling ({outcome:?})"
                )));
            }
        }

        let budget = Arc::new(BudgetGate::new(self.config.page_budget));
        let counters = Arc::new(CrawlCounters::default());
        let failed = Arc::new(Mutex::new(Vec::new()));

        info!(
            budget = self.config.page_budget,
            workers = self.config.workers,
            delay_ms = self.config.request_delay_ms,
            strategy = self.fetcher.name(),
            "starting crawl"
        );

        let mut workers = JoinSet::new();
        for worker in 0..self.config.workers {
            let ctx = WorkerCtx {
                config: self.config.clone(),
                fetcher: Arc::clone(&self.fetcher),
                frontier: Arc::clone(&frontier),
                budget: Arc::clone(&budget),
                counters: Arc::clone(&counters),
                failed: Arc::clone(&failed),
                pages: pages.clone(),
                cancel: Arc::clone(&cancel),
            };
            workers.spawn(worker_loop(worker, ctx));
        }
        drop(pages);

        // A panicked worker leaves its in-flight count leaked, so peers would
        // poll the frontier forever. Raise the cancel flag to stop them, drain
        // the pool, then abort the run.
        let mut panicked: Option<tokio::task::JoinError> = None;
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                cancel.store(true, Ordering::SeqCst);
                panicked.get_or_insert(e);
            }
        }
        if let Some(e) = panicked {
            return Err(RivalmapError::Crawl(format!("crawl worker panicked: {e}")));
        }

        let failed = {
            let mut guard = failed.lock().await;
            std::mem::take(&mut *guard)
        };

        let outcome = CrawlOutcome {
            pages_fetched: counters.pages.load(Ordering::Relaxed),
            failed,
            duplicate_links: counters.duplicates.load(Ordering::Relaxed),
            offsite_links: counters.offsite.load(Ordering::Relaxed),
            invalid_links: counters.invalid.load(Ordering::Relaxed),
            url_records: frontier.records().await,
            duration: started.elapsed(),
            cancelled: cancel.load(Ordering::SeqCst),
        };

        info!(
            pages_fetched = outcome.pages_fetched,
            failed = outcome.failed.len(),
            duplicate_links = outcome.duplicate_links,
            offsite_links = outcome.offsite_links,
            duration_ms = outcome.duration.as_millis(),
            cancelled = outcome.cancelled,
            "crawl finished"
        );

        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CrawlCounters {
    pages: AtomicUsize,
    duplicates: AtomicUsize,
    offsite: AtomicUsize,
    invalid: AtomicUsize,
}

struct WorkerCtx {
    config: RunConfig,
    fetcher: Arc<dyn FetchStrategy>,
    frontier: Arc<Frontier>,
    budget: Arc<BudgetGate>,
    counters: Arc<CrawlCounters>,
    failed: Arc<Mutex<Vec<(String, String)>>>,
    pages: mpsc::Sender<Page>,
    cancel: Arc<AtomicBool>,
}

async fn worker_loop(worker: usize, ctx: WorkerCtx) {
    loop {
        if ctx.cancel.load(Ordering::SeqCst) {
            debug!(worker, "cancellation requested, stopping");
            break;
        }
        if !ctx.budget.try_reserve() {
            debug!(worker, "page budget spent, stopping");
            break;
        }

        let record = match ctx.frontier.dequeue().await {
            Dequeue::Item(record) => record,
            Dequeue::Wait(wait) => {
                ctx.budget.release();
                tokio::time::sleep(wait).await;
                continue;
            }
            Dequeue::Exhausted => {
                ctx.budget.release();
                break;
            }
        };

        let url = match Url::parse(&record.url) {
            Ok(url) => url,
            Err(e) => {
                warn!(url = %record.url, error = %e, "dropping unparseable frontier entry");
                ctx.frontier.mark_failed(&record.url).await;
                ctx.budget.release();
                continue;
            }
        };

        match fetch_with_retry(&*ctx.fetcher, &url, &ctx.config, &ctx.cancel).await {
            Ok(content) => {
                let page = build_page(&record, content);
                ctx.frontier.mark_fetched(&record.url).await;
                discover_links(&ctx, &page).await;
                if ctx.pages.send(page).await.is_err() {
                    debug!(worker, "page channel closed, stopping");
                    ctx.cancel.store(true, Ordering::SeqCst);
                    break;
                }
                ctx.counters.pages.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!(url = %record.url, error = %e, "fetch failed after retries");
                ctx.frontier.mark_failed(&record.url).await;
                ctx.budget.release();
                ctx.failed
                    .lock()
                    .await
                    .push((record.url.clone(), e.to_string()));
            }
        }
    }
}

/// Fetch one URL, retrying failures with doubling backoff.
///
/// Gives up early once cancellation is raised so a cancelled crawl drains
/// quickly instead of sitting out its remaining backoffs.
async fn fetch_with_retry(
    fetcher: &dyn FetchStrategy,
    url: &Url,
    config: &RunConfig,
    cancel: &AtomicBool,
) -> std::result::Result<FetchedContent, FetchError> {
    let max_attempts = config.max_attempts.max(1);
    let mut backoff = config.backoff_base();
    let mut attempt = 1;

    loop {
        match fetcher.fetch(url).await {
            Ok(content) => {
                debug!(%url, attempt, status = content.http_status, "fetched");
                return Ok(content);
            }
            Err(e) if attempt < max_attempts && !cancel.load(Ordering::SeqCst) => {
                debug!(
                    %url,
                    attempt,
                    backoff_ms = backoff.as_millis(),
                    error = %e,
                    "fetch attempt failed, backing off"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Feed a fetched page's links back into the frontier.
async fn discover_links(ctx: &WorkerCtx, page: &Page) {
    for link in &page.links {
        match ctx
            .frontier
            .enqueue(link, Some(&page.url), page.depth + 1)
            .await
        {
            EnqueueOutcome::Added | EnqueueOutcome::TooDeep => {}
            EnqueueOutcome::Seen => {
                ctx.counters.duplicates.fetch_add(1, Ordering::Relaxed);
            }
            EnqueueOutcome::Offsite => {
                ctx.counters.offsite.fetch_add(1, Ordering::Relaxed);
            }
            EnqueueOutcome::Invalid => {
                ctx.counters.invalid.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Page assembly
// ---------------------------------------------------------------------------

/// Assemble the page record streamed to the caller.
fn build_page(record: &UrlRecord, content: FetchedContent) -> Page {
    let (title, links) = parse_html(&content.body, &content.final_url);
    Page {
        url: record.url.clone(),
        title,
        fetched_at: Utc::now(),
        http_status: content.http_status,
        content_type: content.content_type,
        content_hash: compute_hash(&content.body),
        depth: record.depth,
        links,
        raw_content: content.body,
    }
}

/// Pull the title and outbound links from a page body.
///
/// Links are resolved against the URL the response came from, so pages
/// behind redirects resolve relative links correctly.
fn parse_html(body: &str, base: &Url) -> (Option<String>, Vec<String>) {
    let doc = Html::parse_document(body);

    let title_sel = Selector::parse("title").unwrap();
    let h1_sel = Selector::parse("h1").unwrap();
    let title = doc
        .select(&title_sel)
        .next()
        .or_else(|| doc.select(&h1_sel).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    (title, extract_links(&doc, base))
}

/// Extract the links from a document, resolved against the base URL and
/// deduplicated in document order.
fn extract_links(doc: &Html, base: &Url) -> Vec<String> {
    let link_sel = Selector::parse("a[href]").unwrap();
    let mut links = Vec::new();
    let mut seen = HashSet::new();

    for el in doc.select(&link_sel) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
        {
            continue;
        }
        if let Ok(mut resolved) = base.join(href) {
            resolved.set_fragment(None);
            let link = resolved.to_string();
            if seen.insert(link.clone()) {
                links.push(link);
            }
        }
    }

    links
}

/// SHA-256 hash of page content, hex encoded.
fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
