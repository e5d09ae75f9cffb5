//! URL frontier: dedup, scope filtering, and per-host politeness.
//!
//! All crawl workers share one frontier. A URL is admitted once in normalized
//! form, and each host hands out at most one fetch per politeness window.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

use rivalmap_shared::{Result, RivalmapError, RunConfig, UrlRecord, UrlStatus, base_domain};

/// Query parameters stripped during normalization, besides the `utm_` family.
const TRACKING_PARAMS: [&str; 6] = ["gclid", "fbclid", "mc_cid", "mc_eid", "igshid", "ref"];

/// How long dequeue asks callers to wait while peers still have work in flight.
const DRAIN_POLL: Duration = Duration::from_millis(50);

fn is_tracking_param(name: &str) -> bool {
    name.starts_with("utm_") || TRACKING_PARAMS.contains(&name)
}

/// Normalize a URL to its dedup identity: lowercase scheme and host, no
/// fragment, no tracking parameters, no trailing slash except at the root.
pub fn normalize_url(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);

    let kept: Vec<(String, String)> = normalized
        .query_pairs()
        .filter(|(name, _)| !is_tracking_param(name))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    if kept.is_empty() {
        normalized.set_query(None);
    } else {
        let mut pairs = normalized.query_pairs_mut();
        pairs.clear();
        for (name, value) in &kept {
            pairs.append_pair(name, value);
        }
    }

    // Trim the path itself, not the serialized URL: a surviving query would
    // otherwise hide a trailing slash.
    let path = normalized.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        normalized.set_path(path.trim_end_matches('/'));
    }

    normalized.to_string()
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Which URLs belong to a crawl, derived from the seed's base domain.
#[derive(Debug, Clone)]
pub struct DomainScope {
    base: String,
    include_subdomains: bool,
}

impl DomainScope {
    /// Derive the scope from a seed URL.
    pub fn new(seed: &Url, include_subdomains: bool) -> Result<Self> {
        let host = seed
            .host_str()
            .ok_or_else(|| RivalmapError::config(format!("seed URL has no host: {seed}")))?;
        Ok(Self {
            base: base_domain(host),
            include_subdomains,
        })
    }

    /// Base domain the scope was derived from.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// True when `url` is inside the crawl scope.
    pub fn contains(&self, url: &Url) -> bool {
        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        let candidate = base_domain(host);
        if candidate == self.base {
            return true;
        }
        self.include_subdomains && candidate.ends_with(&format!(".{}", self.base))
    }
}

// ---------------------------------------------------------------------------
// Frontier
// ---------------------------------------------------------------------------

/// What happened to a URL offered to the frontier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// New in-scope URL, queued for fetching.
    Added,
    /// Already known in normalized form.
    Seen,
    /// In scope but past the depth bound. Recorded as skipped.
    TooDeep,
    /// Outside the crawl scope. Recorded as skipped.
    Offsite,
    /// Not a parseable absolute URL. Dropped without a record.
    Invalid,
}

/// Result of asking the frontier for work.
#[derive(Debug, Clone)]
pub enum Dequeue {
    /// A URL ready to fetch now.
    Item(UrlRecord),
    /// Nothing eligible yet. Check again after this long.
    Wait(Duration),
    /// No pending URLs and nothing in flight.
    Exhausted,
}

struct PendingUrl {
    key: String,
    host: String,
}

#[derive(Default)]
struct FrontierState {
    /// Normalized URL -> record. Discovery order lives in `order`.
    seen: HashMap<String, UrlRecord>,
    order: Vec<String>,
    pending: VecDeque<PendingUrl>,
    /// Host -> earliest instant the next fetch to it may start.
    next_eligible: HashMap<String, Instant>,
    in_flight: usize,
}

/// Shared crawl frontier.
pub struct Frontier {
    scope: DomainScope,
    delay: Duration,
    max_depth: u32,
    state: Mutex<FrontierState>,
}

impl Frontier {
    /// Build a frontier scoped to the seed's domain.
    pub fn new(seed: &Url, config: &RunConfig) -> Result<Self> {
        Ok(Self {
            scope: DomainScope::new(seed, config.include_subdomains)?,
            delay: config.request_delay(),
            max_depth: config.max_depth,
            state: Mutex::new(FrontierState::default()),
        })
    }

    /// Offer a URL to the frontier.
    ///
    /// `depth` is the link distance from the seed. Off-scope and too-deep
    /// URLs are remembered as skipped so the run log shows every URL
    /// considered; unparseable ones are dropped.
    pub async fn enqueue(
        &self,
        raw: &str,
        discovered_from: Option<&str>,
        depth: u32,
    ) -> EnqueueOutcome {
        let Ok(parsed) = Url::parse(raw) else {
            debug!(url = raw, "dropping unparseable link");
            return EnqueueOutcome::Invalid;
        };
        let Some(host) = parsed.host_str().map(str::to_string) else {
            return EnqueueOutcome::Invalid;
        };
        let key = normalize_url(&parsed);

        let mut state = self.state.lock().await;
        if state.seen.contains_key(&key) {
            return EnqueueOutcome::Seen;
        }

        let (status, outcome) = if !self.scope.contains(&parsed) {
            (UrlStatus::Skipped, EnqueueOutcome::Offsite)
        } else if depth > self.max_depth {
            (UrlStatus::Skipped, EnqueueOutcome::TooDeep)
        } else {
            (UrlStatus::Pending, EnqueueOutcome::Added)
        };

        let record = UrlRecord {
            url: key.clone(),
            discovered_from: discovered_from.map(str::to_string),
            depth,
            status,
        };
        state.seen.insert(key.clone(), record);
        state.order.push(key.clone());
        if outcome == EnqueueOutcome::Added {
            state.pending.push_back(PendingUrl { key, host });
        }
        outcome
    }

    /// Ask for the next URL whose host is polite to fetch now.
    ///
    /// Claiming a URL stamps its host's next-eligible time, so concurrent
    /// workers space out fetches to the same host by the configured delay.
    pub async fn dequeue(&self) -> Dequeue {
        let mut state = self.state.lock().await;

        if state.pending.is_empty() {
            if state.in_flight == 0 {
                return Dequeue::Exhausted;
            }
            // Peers may still discover links.
            return Dequeue::Wait(DRAIN_POLL);
        }

        let now = Instant::now();
        let mut shortest: Option<Duration> = None;

        for index in 0..state.pending.len() {
            let host = &state.pending[index].host;
            if let Some(at) = state.next_eligible.get(host) {
                if *at > now {
                    let wait = *at - now;
                    shortest = Some(match shortest {
                        Some(current) if current < wait => current,
                        _ => wait,
                    });
                    continue;
                }
            }

            let pending = state.pending.remove(index).expect("index is in bounds");
            state.next_eligible.insert(pending.host, now + self.delay);
            state.in_flight += 1;
            let record = state
                .seen
                .get_mut(&pending.key)
                .expect("pending URLs are always in seen");
            record.status = UrlStatus::InFlight;
            return Dequeue::Item(record.clone());
        }

        Dequeue::Wait(shortest.unwrap_or(self.delay))
    }

    /// Record a successful fetch.
    pub async fn mark_fetched(&self, url: &str) {
        self.finish(url, UrlStatus::Fetched).await;
    }

    /// Record a URL that exhausted its fetch attempts.
    pub async fn mark_failed(&self, url: &str) {
        self.finish(url, UrlStatus::Failed).await;
    }

    async fn finish(&self, url: &str, status: UrlStatus) {
        let mut state = self.state.lock().await;
        if let Some(record) = state.seen.get_mut(url) {
            record.status = status;
        }
        state.in_flight = state.in_flight.saturating_sub(1);
    }

    /// Every URL the frontier has seen, in discovery order.
    pub async fn records(&self) -> Vec<UrlRecord> {
        let state = self.state.lock().await;
        state
            .order
            .iter()
            .filter_map(|key| state.seen.get(key).cloned())
            .collect()
    }
}

#[cfg(test)]
mod frontier_tests {
    use super::*;

    fn test_config() -> RunConfig {
        RunConfig {
            request_delay_ms: 600,
            max_depth: 2,
            ..RunConfig::default()
        }
    }

    fn frontier(seed: &str) -> Frontier {
        let seed = Url::parse(seed).expect("seed URL");
        Frontier::new(&seed, &test_config()).expect("frontier")
    }

    fn parse(raw: &str) -> Url {
        Url::parse(raw).expect("URL")
    }

    #[test]
    fn normalize_strips_fragment_and_tracking_params() {
        let url = parse("https://Example.com/Pricing?utm_source=tw&plan=pro#top");
        assert_eq!(normalize_url(&url), "https://example.com/Pricing?plan=pro");

        let url = parse("https://example.com/about/#team");
        assert_eq!(normalize_url(&url), "https://example.com/about");
    }

    #[test]
    fn normalize_drops_query_left_empty_by_tracking_params() {
        let url = parse("https://example.com/?utm_campaign=launch&fbclid=abc");
        assert_eq!(normalize_url(&url), "https://example.com/");
    }

    #[test]
    fn normalize_keeps_root_slash() {
        let url = parse("https://example.com/");
        assert_eq!(normalize_url(&url), "https://example.com/");

        let url = parse("https://example.com/docs/");
        assert_eq!(normalize_url(&url), "https://example.com/docs");
    }

    #[test]
    fn normalize_trims_trailing_slash_behind_a_query() {
        let slashed = parse("https://example.com/docs/?plan=pro");
        let plain = parse("https://example.com/docs?plan=pro");
        assert_eq!(normalize_url(&slashed), "https://example.com/docs?plan=pro");
        assert_eq!(normalize_url(&slashed), normalize_url(&plain));
    }

    #[test]
    fn scope_covers_subdomains_when_enabled() {
        let seed = parse("https://www.example.com/");
        let scope = DomainScope::new(&seed, true).expect("scope");

        assert_eq!(scope.base(), "example.com");
        assert!(scope.contains(&parse("https://example.com/pricing")));
        assert!(scope.contains(&parse("https://docs.example.com/api")));
        assert!(!scope.contains(&parse("https://not-example.com/")));
        assert!(!scope.contains(&parse("ftp://example.com/file")));

        let strict = DomainScope::new(&seed, false).expect("scope");
        assert!(strict.contains(&parse("https://www.example.com/pricing")));
        assert!(!strict.contains(&parse("https://docs.example.com/api")));
    }

    #[tokio::test]
    async fn enqueue_dedups_normalized_variants() {
        let f = frontier("https://example.com/");
        assert_eq!(
            f.enqueue("https://example.com/a", None, 0).await,
            EnqueueOutcome::Added
        );
        assert_eq!(
            f.enqueue("https://example.com/a#section", None, 1).await,
            EnqueueOutcome::Seen
        );
        assert_eq!(
            f.enqueue("https://example.com/a?utm_medium=email", None, 1)
                .await,
            EnqueueOutcome::Seen
        );
        assert_eq!(f.records().await.len(), 1);
    }

    #[tokio::test]
    async fn enqueue_records_offsite_urls_as_skipped() {
        let f = frontier("https://example.com/");
        assert_eq!(
            f.enqueue("https://elsewhere.com/x", Some("https://example.com/"), 1)
                .await,
            EnqueueOutcome::Offsite
        );

        let records = f.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, UrlStatus::Skipped);
        assert_eq!(records[0].url, "https://elsewhere.com/x");
    }

    #[tokio::test]
    async fn enqueue_respects_depth_bound() {
        let f = frontier("https://example.com/");
        assert_eq!(
            f.enqueue("https://example.com/shallow", None, 2).await,
            EnqueueOutcome::Added
        );
        assert_eq!(
            f.enqueue("https://example.com/deep", None, 3).await,
            EnqueueOutcome::TooDeep
        );

        let records = f.records().await;
        let deep = records
            .iter()
            .find(|r| r.url.ends_with("/deep"))
            .expect("deep record");
        assert_eq!(deep.status, UrlStatus::Skipped);
    }

    #[tokio::test]
    async fn enqueue_drops_malformed_links() {
        let f = frontier("https://example.com/");
        assert_eq!(
            f.enqueue("not a url at all", None, 1).await,
            EnqueueOutcome::Invalid
        );
        assert!(f.records().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dequeue_spaces_same_host_fetches() {
        let f = frontier("https://example.com/");
        f.enqueue("https://example.com/a", None, 0).await;
        f.enqueue("https://example.com/b", None, 0).await;

        assert!(matches!(f.dequeue().await, Dequeue::Item(_)));

        // Same host is not eligible again inside the delay window.
        let second = f.dequeue().await;
        let Dequeue::Wait(wait) = second else {
            panic!("expected a wait, got {second:?}");
        };
        assert!(wait <= Duration::from_millis(600));

        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(matches!(f.dequeue().await, Dequeue::Item(_)));
    }

    #[tokio::test]
    async fn dequeue_drains_in_flight_work_before_exhausting() {
        let f = frontier("https://example.com/");
        f.enqueue("https://example.com/a", None, 0).await;

        let Dequeue::Item(record) = f.dequeue().await else {
            panic!("expected an item");
        };
        assert!(matches!(f.dequeue().await, Dequeue::Wait(_)));

        f.mark_fetched(&record.url).await;
        assert!(matches!(f.dequeue().await, Dequeue::Exhausted));

        let records = f.records().await;
        assert_eq!(records[0].status, UrlStatus::Fetched);
    }

    #[tokio::test]
    async fn records_keep_discovery_order() {
        let f = frontier("https://example.com/");
        f.enqueue("https://example.com/first", None, 0).await;
        f.enqueue("https://example.com/second", None, 1).await;
        f.enqueue("https://offsite.com/third", None, 1).await;

        let urls: Vec<String> = f.records().await.into_iter().map(|r| r.url).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/first",
                "https://example.com/second",
                "https://offsite.com/third",
            ]
        );
    }
}
