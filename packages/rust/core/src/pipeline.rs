//! End-to-end run pipeline: crawl → extract/score → trim → synthesize →
//! export bundle.
//!
//! Every stage persists its output stream before the next stage starts, and
//! the manifest records completion, so an interrupted run resumes by
//! replaying finished stages from disk instead of recomputing them.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};
use url::Url;

use rivalmap_crawler::Crawler;
use rivalmap_evidence::{ExportBundle, build_bundle, synthesize};
use rivalmap_extract::{extract_paragraphs, to_markdown};
use rivalmap_rank::{build_profiles, score_all, trim};
use rivalmap_shared::{
    EvidencePack, Page, Result, RivalmapError, RunConfig, RunId, ScoredParagraph, Snippet,
    TopicConfig, UrlRecord, UrlStatus, base_domain,
};
use rivalmap_store::{
    RecordWriter, RunManifest, RunStore, STAGE_BUNDLE, STAGE_CRAWL, STAGE_SCORE, STAGE_SYNTHESIZE,
    STAGE_TRIM, read_records,
};

use crate::summarize::Summarizer;

/// Bounded channel between the crawl workers and the scoring consumer.
const PAGE_CHANNEL_CAPACITY: usize = 32;

/// One pipeline invocation.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Domain or root URL to crawl. A bare domain gets an `https://` scheme.
    pub seed: String,
    /// Run settings, validated before any work starts.
    pub config: RunConfig,
    /// Configured topic profiles; empty means the built-in taxonomy.
    pub topics: Vec<TopicConfig>,
}

/// What a finished (or cancelled) run produced.
#[derive(Debug)]
pub struct RunSummary {
    /// Run directory under the output root.
    pub run_dir: PathBuf,
    pub run_id: RunId,
    pub domain: String,
    pub pages_fetched: usize,
    /// URLs that exhausted their fetch attempts.
    pub failed_urls: usize,
    pub scored_paragraphs: usize,
    pub snippets: usize,
    pub packs: usize,
    /// True when the run stopped on the cancellation signal.
    pub cancelled: bool,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called for each page persisted during the crawl.
    fn page_fetched(&self, url: &str, fetched: usize, budget: usize);
    /// Called when the pipeline completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn page_fetched(&self, _url: &str, _fetched: usize, _budget: usize) {}
    fn done(&self, _summary: &RunSummary) {}
}

/// Output of one independently-run stage command.
#[derive(Debug)]
pub struct StageOutcome {
    /// Run directory under the output root.
    pub run_dir: PathBuf,
    /// Records written to the stage's stream.
    pub records: usize,
    /// True when the stage stopped on the cancellation signal.
    pub cancelled: bool,
}

/// Parse a seed that may be a bare domain: `acme.com` becomes
/// `https://acme.com/`.
pub fn parse_seed(seed: &str) -> Result<Url> {
    let trimmed = seed.trim();
    if trimmed.is_empty() {
        return Err(RivalmapError::validation("seed must not be empty"));
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let url = Url::parse(&candidate)
        .map_err(|e| RivalmapError::validation(format!("invalid seed {trimmed:?}: {e}")))?;
    if url.host_str().is_none() {
        return Err(RivalmapError::validation(format!(
            "seed {trimmed:?} has no host"
        )));
    }
    Ok(url)
}

/// Run the full pipeline for one seed.
///
/// Stages whose streams are already complete in the run directory are
/// replayed from disk; everything downstream of the first recomputed stage
/// is recomputed too. A cancelled crawl still flows through the later stages
/// so partial output stays useful, but is not marked complete.
#[instrument(skip_all, fields(seed = %request.seed))]
pub async fn run_pipeline(
    request: &RunRequest,
    summarizer: Option<&dyn Summarizer>,
    progress: &dyn ProgressReporter,
    cancel: Arc<AtomicBool>,
) -> Result<RunSummary> {
    let start = Instant::now();
    let RunContext {
        store,
        mut manifest,
        seed,
        domain,
    } = open_run(request)?;
    let manifest_path = store.manifest_path();

    // --- Crawl + score (streamed together) ---
    let mut dirty = false;
    let stage = if manifest.is_complete(STAGE_CRAWL) && manifest.is_complete(STAGE_SCORE) {
        progress.phase("Replaying scored paragraphs");
        CrawlStage {
            scored: read_records(&store.scored_path())?,
            pages_fetched: manifest.records_for(STAGE_CRAWL).unwrap_or(0),
            failed_urls: count_failed(&store.urls_path())?,
            cancelled: false,
        }
    } else {
        dirty = true;
        progress.phase("Crawling pages");
        let stage = crawl_and_score(request, &seed, &store, progress, cancel).await?;
        if !stage.cancelled {
            manifest.mark_complete(STAGE_CRAWL, stage.pages_fetched);
            manifest.mark_complete(STAGE_SCORE, stage.scored.len());
            manifest.save(&manifest_path)?;
        }
        stage
    };
    let scored_count = stage.scored.len();

    // --- Trim ---
    let snippets: Vec<Snippet> = if !dirty && manifest.is_complete(STAGE_TRIM) {
        progress.phase("Replaying snippets");
        read_records(&store.snippets_path())?
    } else {
        dirty = true;
        progress.phase("Trimming snippets");
        let snippets = trim(stage.scored, request.config.top_k);
        write_stream(&store.snippets_path(), &snippets)?;
        manifest.mark_complete(STAGE_TRIM, snippets.len());
        manifest.save(&manifest_path)?;
        snippets
    };
    let snippet_count = snippets.len();

    // --- Synthesize ---
    let packs: Vec<EvidencePack> = if !dirty && manifest.is_complete(STAGE_SYNTHESIZE) {
        progress.phase("Replaying evidence packs");
        read_records(&store.packs_path())?
    } else {
        progress.phase("Synthesizing evidence packs");
        let packs = synthesize(snippets, request.config.max_per_domain);
        write_stream(&store.packs_path(), &packs)?;
        manifest.mark_complete(STAGE_SYNTHESIZE, packs.len());
        manifest.save(&manifest_path)?;
        packs
    };

    // --- Export bundle ---
    // Always rebuilt: a resumed run may supply a summarizer the first one
    // lacked.
    let bundled = write_bundle(
        &store,
        &domain,
        &packs,
        stage.pages_fetched,
        summarizer,
        progress,
    )
    .await?;
    manifest.mark_complete(STAGE_BUNDLE, bundled);
    manifest.save(&manifest_path)?;

    let summary = RunSummary {
        run_dir: store.root().to_path_buf(),
        run_id: manifest.run_id.clone(),
        domain,
        pages_fetched: stage.pages_fetched,
        failed_urls: stage.failed_urls,
        scored_paragraphs: scored_count,
        snippets: snippet_count,
        packs: packs.len(),
        cancelled: stage.cancelled,
        elapsed: start.elapsed(),
    };
    progress.done(&summary);
    info!(
        run_dir = %summary.run_dir.display(),
        pages = summary.pages_fetched,
        failed = summary.failed_urls,
        snippets = summary.snippets,
        packs = summary.packs,
        cancelled = summary.cancelled,
        elapsed_ms = summary.elapsed.as_millis(),
        "run complete"
    );
    Ok(summary)
}

// ---------------------------------------------------------------------------
// Stage commands
// ---------------------------------------------------------------------------

/// Crawl and score only, leaving trimming and synthesis for later
/// invocations against the same run directory.
#[instrument(skip_all, fields(seed = %request.seed))]
pub async fn run_crawl_stage(
    request: &RunRequest,
    progress: &dyn ProgressReporter,
    cancel: Arc<AtomicBool>,
) -> Result<StageOutcome> {
    let mut ctx = open_run(request)?;
    progress.phase("Crawling pages");
    let stage = crawl_and_score(request, &ctx.seed, &ctx.store, progress, cancel).await?;
    if !stage.cancelled {
        ctx.manifest.mark_complete(STAGE_CRAWL, stage.pages_fetched);
        ctx.manifest.mark_complete(STAGE_SCORE, stage.scored.len());
        ctx.manifest.save(&ctx.store.manifest_path())?;
    }
    Ok(StageOutcome {
        run_dir: ctx.store.root().to_path_buf(),
        records: stage.pages_fetched,
        cancelled: stage.cancelled,
    })
}

/// Trim previously scored paragraphs into top-K snippets per topic.
pub fn run_trim_stage(
    request: &RunRequest,
    progress: &dyn ProgressReporter,
) -> Result<StageOutcome> {
    let mut ctx = open_run(request)?;
    if !ctx.manifest.is_complete(STAGE_SCORE) {
        return Err(RivalmapError::validation(
            "this run directory has no scored paragraphs yet; crawl first",
        ));
    }
    progress.phase("Trimming snippets");
    let scored: Vec<ScoredParagraph> = read_records(&ctx.store.scored_path())?;
    let snippets = trim(scored, request.config.top_k);
    write_stream(&ctx.store.snippets_path(), &snippets)?;
    ctx.manifest.mark_complete(STAGE_TRIM, snippets.len());
    ctx.manifest.save(&ctx.store.manifest_path())?;
    Ok(StageOutcome {
        run_dir: ctx.store.root().to_path_buf(),
        records: snippets.len(),
        cancelled: false,
    })
}

/// Build evidence packs and the export bundle from trimmed snippets.
pub async fn run_synthesize_stage(
    request: &RunRequest,
    summarizer: Option<&dyn Summarizer>,
    progress: &dyn ProgressReporter,
) -> Result<StageOutcome> {
    let mut ctx = open_run(request)?;
    if !ctx.manifest.is_complete(STAGE_TRIM) {
        return Err(RivalmapError::validation(
            "this run directory has no snippets yet; crawl and score first",
        ));
    }
    progress.phase("Synthesizing evidence packs");
    let snippets: Vec<Snippet> = read_records(&ctx.store.snippets_path())?;
    let packs = synthesize(snippets, request.config.max_per_domain);
    write_stream(&ctx.store.packs_path(), &packs)?;
    ctx.manifest.mark_complete(STAGE_SYNTHESIZE, packs.len());

    let pages_fetched = ctx.manifest.records_for(STAGE_CRAWL).unwrap_or(0);
    let bundled = write_bundle(
        &ctx.store,
        &ctx.domain,
        &packs,
        pages_fetched,
        summarizer,
        progress,
    )
    .await?;
    ctx.manifest.mark_complete(STAGE_BUNDLE, bundled);
    ctx.manifest.save(&ctx.store.manifest_path())?;
    Ok(StageOutcome {
        run_dir: ctx.store.root().to_path_buf(),
        records: packs.len(),
        cancelled: false,
    })
}

// ---------------------------------------------------------------------------
// Shared plumbing
// ---------------------------------------------------------------------------

struct RunContext {
    store: RunStore,
    manifest: RunManifest,
    seed: Url,
    domain: String,
}

/// Validate the request and open (or resume) its run directory.
fn open_run(request: &RunRequest) -> Result<RunContext> {
    request.config.validate()?;
    let seed = parse_seed(&request.seed)?;
    let domain = base_domain(seed.host_str().unwrap_or_default());

    let store = RunStore::open(&request.config.out_root, &domain)?;
    let manifest_path = store.manifest_path();
    let manifest = if manifest_path.exists() {
        let existing = RunManifest::load(&manifest_path)?;
        if existing.config != request.config {
            return Err(RivalmapError::config(
                "run directory was produced with different settings; change out_root or match them",
            ));
        }
        info!(run_id = %existing.run_id, "resuming existing run");
        existing
    } else {
        RunManifest::new(&domain, seed.as_str(), &request.config)
    };
    Ok(RunContext {
        store,
        manifest,
        seed,
        domain,
    })
}

/// Write a whole stage output as a fresh JSONL stream.
fn write_stream<T: Serialize>(path: &Path, records: &[T]) -> Result<usize> {
    let mut writer: RecordWriter<T> = RecordWriter::create(path)?;
    for record in records {
        writer.append(record)?;
    }
    Ok(writer.written())
}

/// Build `export/bundle.json`, requesting summaries when a summarizer is
/// available. Returns the number of packs in the bundle.
async fn write_bundle(
    store: &RunStore,
    domain: &str,
    packs: &[EvidencePack],
    pages_fetched: usize,
    summarizer: Option<&dyn Summarizer>,
    progress: &dyn ProgressReporter,
) -> Result<usize> {
    progress.phase("Building export bundle");
    let mut bundle = build_bundle(domain, packs, pages_fetched);
    if let Some(summarizer) = summarizer {
        progress.phase("Requesting summaries");
        for pack in &mut bundle.packs {
            let texts: Vec<String> = pack.snippets.iter().map(|s| s.text.clone()).collect();
            match summarizer.summarize(&pack.topic, &texts).await {
                Ok(summary) => pack.summary = Some(summary),
                Err(e) => warn!(topic = %pack.topic, error = %e, "summarization failed"),
            }
        }
    }
    write_page_renditions(store, &bundle)?;
    let json = serde_json::to_string_pretty(&bundle)
        .map_err(|e| RivalmapError::Store(format!("serialize bundle: {e}")))?;
    let bundle_path = store.bundle_path();
    fs::write(&bundle_path, json).map_err(|e| RivalmapError::io(&bundle_path, e))?;
    Ok(bundle.packs.len())
}

/// Write a Markdown rendition of every page the bundle cites under
/// `export/pages/`, so report generation gets full page bodies next to the
/// truncated bundle snippets. A page that fails to convert is skipped.
fn write_page_renditions(store: &RunStore, bundle: &ExportBundle) -> Result<usize> {
    let cited: HashSet<&str> = bundle.evidence_urls.iter().map(String::as_str).collect();
    let pages: Vec<Page> = read_records(&store.pages_path())?;
    let mut written = 0;
    for page in &pages {
        if !cited.contains(page.url.as_str()) {
            continue;
        }
        match to_markdown(&page.raw_content) {
            Ok(markdown) if !markdown.is_empty() => {
                let path = store.page_markdown_path(&page.url, &page.content_hash);
                fs::write(&path, markdown).map_err(|e| RivalmapError::io(&path, e))?;
                written += 1;
            }
            Ok(_) => {}
            Err(e) => warn!(url = %page.url, error = %e, "markdown rendition failed"),
        }
    }
    info!(renditions = written, "page renditions written");
    Ok(written)
}

// ---------------------------------------------------------------------------
// Crawl + score stage
// ---------------------------------------------------------------------------

struct CrawlStage {
    scored: Vec<ScoredParagraph>,
    pages_fetched: usize,
    failed_urls: usize,
    cancelled: bool,
}

/// Streams pages out of the crawler, persisting each page and its scored
/// paragraphs as they arrive.
async fn crawl_and_score(
    request: &RunRequest,
    seed: &Url,
    store: &RunStore,
    progress: &dyn ProgressReporter,
    cancel: Arc<AtomicBool>,
) -> Result<CrawlStage> {
    let profiles = build_profiles(&request.topics);
    let mut pages_writer: RecordWriter<Page> = RecordWriter::create(store.pages_path())?;
    let mut scored_writer: RecordWriter<ScoredParagraph> =
        RecordWriter::create(store.scored_path())?;

    let (tx, mut rx) = mpsc::channel::<Page>(PAGE_CHANNEL_CAPACITY);
    let crawler = Crawler::new(request.config.clone())?;
    let budget = request.config.page_budget;
    let crawl_seed = seed.clone();
    let crawl_task = tokio::spawn(async move { crawler.run(&crawl_seed, tx, cancel).await });

    let mut scored = Vec::new();
    while let Some(page) = rx.recv().await {
        pages_writer.append(&page)?;
        progress.page_fetched(&page.url, pages_writer.written(), budget);
        let paragraphs = extract_paragraphs(&page);
        let mut page_scores = score_all(&paragraphs, &profiles, request.config.noise_floor);
        for record in &page_scores {
            scored_writer.append(record)?;
        }
        scored.append(&mut page_scores);
    }

    let outcome = crawl_task
        .await
        .map_err(|e| RivalmapError::Network(format!("crawl task failed: {e}")))??;

    let mut urls_writer: RecordWriter<UrlRecord> = RecordWriter::create(store.urls_path())?;
    for record in &outcome.url_records {
        urls_writer.append(record)?;
    }

    info!(
        pages = outcome.pages_fetched,
        failed = outcome.failed.len(),
        duplicates = outcome.duplicate_links,
        offsite = outcome.offsite_links,
        scored = scored.len(),
        cancelled = outcome.cancelled,
        "crawl and scoring finished"
    );

    Ok(CrawlStage {
        scored,
        pages_fetched: outcome.pages_fetched,
        failed_urls: outcome.failed.len(),
        cancelled: outcome.cancelled,
    })
}

fn count_failed(urls_path: &Path) -> Result<usize> {
    if !urls_path.exists() {
        return Ok(0);
    }
    let records: Vec<UrlRecord> = read_records(urls_path)?;
    Ok(records
        .iter()
        .filter(|r| r.status == UrlStatus::Failed)
        .count())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod pipeline_tests {
    use std::sync::atomic::AtomicBool;

    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use rivalmap_shared::FetchMode;

    use super::*;

    fn test_root() -> PathBuf {
        std::env::temp_dir().join(format!("rivalmap_pipeline_{}", Uuid::now_v7()))
    }

    fn test_config(out_root: &Path) -> RunConfig {
        RunConfig {
            out_root: out_root.to_string_lossy().into_owned(),
            page_budget: 50,
            request_delay_ms: 300,
            top_k: 5,
            max_per_domain: 3,
            workers: 2,
            max_depth: 2,
            include_subdomains: true,
            fetch_mode: FetchMode::Static,
            fetch_timeout_secs: 5,
            max_attempts: 2,
            backoff_base_ms: 10,
            render_endpoint: None,
            render_token_env: "RIVALMAP_RENDER_TOKEN".to_string(),
            noise_floor: 0.05,
        }
    }

    fn request(server_uri: &str, out_root: &Path) -> RunRequest {
        RunRequest {
            seed: server_uri.to_string(),
            config: test_config(out_root),
            topics: Vec::new(),
        }
    }

    fn html(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .set_body_string(body)
            .insert_header("content-type", "text/html; charset=utf-8")
    }

    async fn mount_site(server: &MockServer) {
        let home = "<html><head><title>Acme</title></head><body>\
             <h1>Acme risk platform</h1>\
             <p>The platform dashboard gives analysts decisioning rules, case management \
             and machine learning signals for every transaction they review each day.</p>\
             <a href=\"/pricing\">Pricing</a> <a href=\"/product\">Product</a>\
             </body></html>";
        let pricing = "<html><body><h1>Pricing</h1>\
             <p>Pricing starts with a free trial, then subscription billing per month on \
             every plan, with an annual tier and volume discounts for larger teams.</p>\
             </body></html>";
        let product = "<html><body><h1>Platform</h1>\
             <p>Our risk engine combines device fingerprint data, biometrics and fraud \
             models to stop account takeover and chargeback abuse before checkout.</p>\
             </body></html>";
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(html(home))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/pricing"))
            .respond_with(html(pricing))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/product"))
            .respond_with(html(product))
            .mount(server)
            .await;
    }

    async fn run(request: &RunRequest, summarizer: Option<&dyn Summarizer>) -> Result<RunSummary> {
        run_pipeline(
            request,
            summarizer,
            &SilentProgress,
            Arc::new(AtomicBool::new(false)),
        )
        .await
    }

    #[tokio::test]
    async fn end_to_end_run_produces_every_stage_output() {
        let server = MockServer::start().await;
        mount_site(&server).await;
        let root = test_root();
        let request = request(&server.uri(), &root);

        let summary = run(&request, None).await.expect("pipeline run");

        assert_eq!(summary.pages_fetched, 3);
        assert_eq!(summary.failed_urls, 0);
        assert!(!summary.cancelled);
        assert!(summary.scored_paragraphs > 0);
        assert!(summary.snippets > 0);
        assert!(summary.packs > 0);

        let store = RunStore::open(&root, &summary.domain).expect("store");
        let pages: Vec<Page> = read_records(&store.pages_path()).expect("pages");
        assert_eq!(pages.len(), 3);
        let packs: Vec<EvidencePack> = read_records(&store.packs_path()).expect("packs");
        assert!(packs.iter().any(|p| p.topic == "pricing"));

        let manifest = RunManifest::load(&store.manifest_path()).expect("manifest");
        for stage in [
            STAGE_CRAWL,
            STAGE_SCORE,
            STAGE_TRIM,
            STAGE_SYNTHESIZE,
            STAGE_BUNDLE,
        ] {
            assert!(manifest.is_complete(stage), "stage {stage} not complete");
        }

        let bundle: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.bundle_path()).expect("bundle file"))
                .expect("bundle json");
        assert_eq!(bundle["pages_fetched"], 3);
        assert!(bundle["evidence_urls"].as_array().is_some_and(|a| !a.is_empty()));

        // Cited pages get a full Markdown rendition next to the bundle.
        let mut renditions = Vec::new();
        for entry in fs::read_dir(store.page_markdown_dir()).expect("renditions dir") {
            let path = entry.expect("dir entry").path();
            renditions.push(fs::read_to_string(&path).expect("rendition"));
        }
        assert!(!renditions.is_empty(), "expected page renditions");
        assert!(renditions.iter().any(|md| md.contains("free trial")));
    }

    #[tokio::test]
    async fn completed_run_resumes_without_network() {
        let root = test_root();
        let first;
        let uri;
        {
            let server = MockServer::start().await;
            mount_site(&server).await;
            uri = server.uri();
            first = run(&request(&uri, &root), None).await.expect("first run");
        }
        // Server is gone; a second run must replay every stage from disk.
        let second = run(&request(&uri, &root), None)
            .await
            .expect("resumed run");

        assert_eq!(second.pages_fetched, first.pages_fetched);
        assert_eq!(second.scored_paragraphs, first.scored_paragraphs);
        assert_eq!(second.snippets, first.snippets);
        assert_eq!(second.packs, first.packs);
        assert_eq!(second.run_id, first.run_id);
    }

    #[tokio::test]
    async fn changed_settings_fail_fast_on_resume() {
        let server = MockServer::start().await;
        mount_site(&server).await;
        let root = test_root();
        run(&request(&server.uri(), &root), None)
            .await
            .expect("first run");

        let mut altered = request(&server.uri(), &root);
        altered.config.top_k = 10;
        let err = run(&altered, None).await.expect_err("config mismatch");
        assert!(err.to_string().contains("different settings"));
    }

    #[tokio::test]
    async fn failed_urls_are_counted_and_the_run_completes() {
        let server = MockServer::start().await;
        let home = "<html><body>\
             <p>The platform dashboard gives analysts decisioning rules, case management \
             and machine learning signals for every transaction they review each day.</p>\
             <a href=\"/broken\">Broken</a>\
             </body></html>";
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(html(home))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let root = test_root();
        let summary = run(&request(&server.uri(), &root), None)
            .await
            .expect("pipeline run");

        assert_eq!(summary.pages_fetched, 1);
        assert_eq!(summary.failed_urls, 1);

        let store = RunStore::open(&root, &summary.domain).expect("store");
        let urls: Vec<UrlRecord> = read_records(&store.urls_path()).expect("urls");
        assert!(urls.iter().any(|r| r.status == UrlStatus::Failed));
    }

    struct StubSummarizer;

    #[async_trait::async_trait]
    impl Summarizer for StubSummarizer {
        async fn summarize(&self, topic: &str, snippet_texts: &[String]) -> Result<String> {
            if topic == "pricing" {
                Ok(format!("{} findings about pricing", snippet_texts.len()))
            } else {
                Err(RivalmapError::Network("summary backend offline".into()))
            }
        }
    }

    #[tokio::test]
    async fn summarizer_failures_leave_null_summaries() {
        let root = test_root();
        let domain;
        {
            let server = MockServer::start().await;
            mount_site(&server).await;
            let summary = run(&request(&server.uri(), &root), None)
                .await
                .expect("first run");
            domain = summary.domain.clone();
            // Resume offline, this time with a summarizer available.
            run(&request(&server.uri(), &root), Some(&StubSummarizer))
                .await
                .expect("resumed run");
        }

        let store = RunStore::open(&root, &domain).expect("store");
        let bundle: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.bundle_path()).expect("bundle file"))
                .expect("bundle json");
        let packs = bundle["packs"].as_array().expect("packs array");
        for pack in packs {
            if pack["topic"] == "pricing" {
                assert!(pack["summary"].as_str().is_some_and(|s| s.contains("pricing")));
            } else {
                assert!(pack["summary"].is_null());
            }
        }
        assert!(packs.iter().any(|p| p["topic"] == "pricing"));
    }

    #[tokio::test]
    async fn stage_commands_compose_into_a_full_run() {
        let server = MockServer::start().await;
        mount_site(&server).await;
        let root = test_root();
        let request = request(&server.uri(), &root);

        let crawled = run_crawl_stage(
            &request,
            &SilentProgress,
            Arc::new(AtomicBool::new(false)),
        )
        .await
        .expect("crawl stage");
        assert_eq!(crawled.records, 3);

        let trimmed = run_trim_stage(&request, &SilentProgress).expect("trim stage");
        assert!(trimmed.records > 0);

        let synthesized = run_synthesize_stage(&request, None, &SilentProgress)
            .await
            .expect("synthesize stage");
        assert!(synthesized.records > 0);

        let store = RunStore::open(&root, "127.0.0.1").expect("store");
        let manifest = RunManifest::load(&store.manifest_path()).expect("manifest");
        for stage in [
            STAGE_CRAWL,
            STAGE_SCORE,
            STAGE_TRIM,
            STAGE_SYNTHESIZE,
            STAGE_BUNDLE,
        ] {
            assert!(manifest.is_complete(stage), "stage {stage} not complete");
        }
        assert!(store.bundle_path().exists());
        let renditions = fs::read_dir(store.page_markdown_dir())
            .expect("renditions dir")
            .count();
        assert!(renditions > 0, "expected page renditions");
    }

    #[tokio::test]
    async fn trim_stage_requires_a_prior_crawl() {
        let root = test_root();
        let request = request("https://acme.example", &root);
        let err = run_trim_stage(&request, &SilentProgress).expect_err("nothing to trim");
        assert!(err.to_string().contains("crawl first"));
    }

    #[test]
    fn score_trim_synthesize_is_deterministic() {
        let page = Page {
            url: "https://acme.example/pricing".to_string(),
            title: Some("Pricing".to_string()),
            fetched_at: chrono::Utc::now(),
            http_status: 200,
            content_type: Some("text/html".to_string()),
            content_hash: String::new(),
            depth: 0,
            links: Vec::new(),
            raw_content: "<html><body><h1>Pricing</h1>\
                 <p>Pricing starts with a free trial, then subscription billing per month \
                 on every plan, with an annual tier and volume discounts for teams.</p>\
                 <p>Our risk engine combines device fingerprint data, biometrics and \
                 fraud models to stop account takeover before checkout completes.</p>\
                 </body></html>"
                .to_string(),
        };

        let pass = || {
            let paragraphs = extract_paragraphs(&page);
            let scored = score_all(&paragraphs, &build_profiles(&[]), 0.05);
            let snippets = trim(scored.clone(), 5);
            let packs = synthesize(snippets.clone(), 3);
            (
                serde_json::to_string(&scored).expect("scored json"),
                serde_json::to_string(&snippets).expect("snippets json"),
                serde_json::to_string(&packs).expect("packs json"),
            )
        };
        assert_eq!(pass(), pass());
    }
}
