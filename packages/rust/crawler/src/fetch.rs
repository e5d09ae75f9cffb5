//! Fetch strategies for page retrieval.
//!
//! Three strategies: plain HTTP ([`StaticFetcher`]), a browserless-style
//! rendering service ([`RenderedFetcher`]), and [`AutoFetcher`], which retries
//! script-thin static results through the rendering service.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use rivalmap_shared::{FetchMode, Result, RivalmapError, RunConfig};

/// User-Agent string for crawl requests.
const USER_AGENT: &str = concat!("RivalMap/", env!("CARGO_PKG_VERSION"));

/// Static results with fewer links than this may need rendering.
const THIN_LINK_COUNT: usize = 10;

/// Static results with less visible text than this may need rendering.
const THIN_TEXT_CHARS: usize = 800;

// ---------------------------------------------------------------------------
// FetchError
// ---------------------------------------------------------------------------

/// A single failed fetch attempt.
///
/// Never fatal to a run: the crawl engine retries with backoff and records
/// the URL as failed once attempts are exhausted.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{url}: request timed out")]
    Timeout { url: String },

    #[error("{url}: {message}")]
    Transport { url: String, message: String },

    #[error("{url}: HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url}: body read failed: {message}")]
    Body { url: String, message: String },
}

impl FetchError {
    fn from_reqwest(url: &Url, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Transport {
                url: url.to_string(),
                message: e.to_string(),
            }
        }
    }
}

/// A successfully fetched page body.
#[derive(Debug, Clone)]
pub struct FetchedContent {
    /// HTTP status of the final response.
    pub http_status: u16,
    /// `Content-Type` header value, if present.
    pub content_type: Option<String>,
    /// URL the response actually came from, after redirects.
    pub final_url: Url,
    /// Response body.
    pub body: String,
}

// ---------------------------------------------------------------------------
// FetchStrategy
// ---------------------------------------------------------------------------

/// How page content is retrieved.
///
/// A strategy performs exactly one attempt per call; retry and backoff live
/// in the crawl engine.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Fetch one page.
    async fn fetch(&self, url: &Url) -> std::result::Result<FetchedContent, FetchError>;

    /// Strategy name, for logs.
    fn name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// StaticFetcher
// ---------------------------------------------------------------------------

/// Plain HTTP GET.
pub struct StaticFetcher {
    client: Client,
}

impl StaticFetcher {
    /// Build the fetcher with a per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .map_err(|e| RivalmapError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl FetchStrategy for StaticFetcher {
    async fn fetch(&self, url: &Url) -> std::result::Result<FetchedContent, FetchError> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let final_url = response.url().clone();

        let body = response.text().await.map_err(|e| FetchError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        Ok(FetchedContent {
            http_status: status.as_u16(),
            content_type,
            final_url,
            body,
        })
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

// ---------------------------------------------------------------------------
// RenderedFetcher
// ---------------------------------------------------------------------------

/// Fetch through a browserless-style `/content` rendering endpoint.
///
/// POSTs `{"url": ...}` and receives the rendered HTML back.
pub struct RenderedFetcher {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl RenderedFetcher {
    /// Build the fetcher against a rendering service base URL.
    pub fn new(endpoint: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| RivalmapError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
        })
    }
}

#[async_trait]
impl FetchStrategy for RenderedFetcher {
    async fn fetch(&self, url: &Url) -> std::result::Result<FetchedContent, FetchError> {
        let mut request = self
            .client
            .post(format!("{}/content", self.endpoint))
            .json(&serde_json::json!({ "url": url.as_str() }));
        if let Some(token) = &self.token {
            request = request.query(&[("token", token.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| FetchError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        Ok(FetchedContent {
            // Status of the rendering service; the page itself rendered.
            http_status: status.as_u16(),
            content_type: Some("text/html".to_string()),
            final_url: url.clone(),
            body,
        })
    }

    fn name(&self) -> &'static str {
        "rendered"
    }
}

// ---------------------------------------------------------------------------
// AutoFetcher
// ---------------------------------------------------------------------------

/// Static first, with a rendered retry when the result looks script-thin.
pub struct AutoFetcher {
    primary: StaticFetcher,
    fallback: RenderedFetcher,
}

impl AutoFetcher {
    pub fn new(primary: StaticFetcher, fallback: RenderedFetcher) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl FetchStrategy for AutoFetcher {
    async fn fetch(&self, url: &Url) -> std::result::Result<FetchedContent, FetchError> {
        let fetched = self.primary.fetch(url).await?;
        if !looks_thin(&fetched.body) {
            return Ok(fetched);
        }

        debug!(%url, "static result looks script-thin, retrying rendered");
        match self.fallback.fetch(url).await {
            Ok(rendered) => Ok(rendered),
            Err(e) => {
                warn!(%url, error = %e, "rendered retry failed, keeping static result");
                Ok(fetched)
            }
        }
    }

    fn name(&self) -> &'static str {
        "auto"
    }
}

/// Heuristic for script-rendered shells: almost no links and almost no
/// visible text.
pub fn looks_thin(html: &str) -> bool {
    let doc = Html::parse_document(html);

    let link_sel = Selector::parse("a[href]").unwrap();
    if doc.select(&link_sel).count() >= THIN_LINK_COUNT {
        return false;
    }

    visible_text_len(&doc) < THIN_TEXT_CHARS
}

/// Total length of text content outside script-like containers.
fn visible_text_len(doc: &Html) -> usize {
    doc.root_element()
        .descendants()
        .filter(|node| {
            !node.ancestors().any(|ancestor| {
                ancestor.value().as_element().is_some_and(|el| {
                    matches!(el.name(), "script" | "style" | "noscript" | "template")
                })
            })
        })
        .filter_map(|node| node.value().as_text())
        .map(|text| text.trim().len())
        .sum()
}

// ---------------------------------------------------------------------------
// Strategy selection
// ---------------------------------------------------------------------------

/// Build the fetch strategy a run is configured for.
pub fn build_fetcher(config: &RunConfig) -> Result<Arc<dyn FetchStrategy>> {
    let timeout = config.fetch_timeout();

    match config.fetch_mode {
        FetchMode::Static => Ok(Arc::new(StaticFetcher::new(timeout)?)),
        FetchMode::Rendered => {
            let endpoint = config.render_endpoint.as_deref().ok_or_else(|| {
                RivalmapError::config("fetch mode \"rendered\" requires fetch.render_endpoint")
            })?;
            Ok(Arc::new(RenderedFetcher::new(
                endpoint,
                config.render_token(),
                timeout,
            )?))
        }
        FetchMode::Auto => match config.render_endpoint.as_deref() {
            Some(endpoint) => Ok(Arc::new(AutoFetcher::new(
                StaticFetcher::new(timeout)?,
                RenderedFetcher::new(endpoint, config.render_token(), timeout)?,
            ))),
            None => {
                warn!("auto fetch mode without fetch.render_endpoint, using static fetches only");
                Ok(Arc::new(StaticFetcher::new(timeout)?))
            }
        },
    }
}
