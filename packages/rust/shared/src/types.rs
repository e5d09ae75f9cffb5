//! Core domain types for RivalMap evidence runs.
//!
//! These structs define the on-disk record streams: every stage writes its
//! output as one JSON object per line, so each type here doubles as a wire
//! format and must stay self-describing.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current schema version for the run manifest format.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// UrlRecord
// ---------------------------------------------------------------------------

/// Lifecycle status of a discovered URL.
///
/// Transitions are driven only by the crawler: `Pending → InFlight` at
/// dequeue, then `Fetched` or `Failed`. `Skipped` marks off-domain
/// discoveries that are recorded but never queued. Records are never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlStatus {
    Pending,
    InFlight,
    Fetched,
    Failed,
    Skipped,
}

/// Audit record for one discovered URL, persisted to `crawl/urls.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlRecord {
    /// Normalized URL (the frontier's dedup key).
    pub url: String,
    /// Normalized URL of the page this one was discovered on (absent for seeds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovered_from: Option<String>,
    /// Link distance from the seed.
    pub depth: u32,
    /// Current lifecycle status.
    pub status: UrlStatus,
}

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

/// One fetched page, persisted to `crawl/pages.jsonl`. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Normalized URL the page was fetched as.
    pub url: String,
    /// Page title from `<title>`, falling back to the first `<h1>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// When the fetch completed.
    pub fetched_at: DateTime<Utc>,
    /// HTTP status code of the final response.
    pub http_status: u16,
    /// `Content-Type` header value, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// SHA-256 hex digest of `raw_content`.
    pub content_hash: String,
    /// Link distance from the seed.
    pub depth: u32,
    /// Absolute links discovered in the content, in document order, deduped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,
    /// The body as fetched (HTML or plain text per `content_type`).
    pub raw_content: String,
}

// ---------------------------------------------------------------------------
// Paragraph
// ---------------------------------------------------------------------------

/// Structural role of an extracted text unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParagraphRole {
    /// `h1`..`h6` content.
    Heading,
    /// Ordinary prose (`p`, `blockquote`).
    Body,
    /// `li` content.
    ListItem,
    /// Anything inside `nav`/`header`/`footer`/`aside`.
    Nav,
    /// Other text-bearing blocks.
    Other,
}

/// One paragraph-granularity unit extracted from a page. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    /// URL of the page this unit came from.
    pub source_url: String,
    /// Whitespace-collapsed text.
    pub text: String,
    /// Ordinal of the unit within its page (0-based, emission order).
    pub position: usize,
    /// Structural role tag.
    pub role: ParagraphRole,
}

/// A paragraph scored against one topic, persisted to `scored/scored.jsonl`.
///
/// A paragraph may appear once per topic it clears the noise floor for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredParagraph {
    pub source_url: String,
    pub text: String,
    pub position: usize,
    pub role: ParagraphRole,
    /// Topic profile name this score is against.
    pub topic: String,
    /// Relevance in [0, 1].
    pub score: f64,
}

impl ScoredParagraph {
    /// View the underlying paragraph fields.
    pub fn paragraph(&self) -> Paragraph {
        Paragraph {
            source_url: self.source_url.clone(),
            text: self.text.clone(),
            position: self.position,
            role: self.role,
        }
    }
}

// ---------------------------------------------------------------------------
// Snippet / EvidencePack
// ---------------------------------------------------------------------------

/// Trimmed, deduplicated projection of a scored paragraph, persisted to
/// `scored/snippets.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snippet {
    pub text: String,
    pub topic: String,
    pub score: f64,
    pub source_url: String,
    /// 1-based position within its topic after trimming.
    pub rank: usize,
}

/// Topic-scoped, source-diversified group of snippets, persisted to
/// `evidence/packs.jsonl`.
///
/// Invariants: snippet scores are non-increasing, and no more than the
/// configured per-domain cap of snippets share one source domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidencePack {
    pub topic: String,
    /// Admitted snippets, descending score.
    pub snippets: Vec<Snippet>,
    /// Base domains contributing at least one snippet (sorted).
    pub source_domains: BTreeSet<String>,
}

// ---------------------------------------------------------------------------
// Domain helpers
// ---------------------------------------------------------------------------

/// Reduce a host to its base domain: lowercase, leading `www.` stripped.
pub fn base_domain(host: &str) -> String {
    let host = host.to_ascii_lowercase();
    host.strip_prefix("www.").unwrap_or(&host).to_string()
}

/// Base domain of an absolute URL string, if it parses and has a host.
pub fn source_domain(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed.host_str().map(base_domain)
}
