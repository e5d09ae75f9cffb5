//! Export bundle: the single serializable artifact handed to report
//! generation, combining run metadata with the evidence packs.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rivalmap_shared::types::EvidencePack;

/// Snippets carried per pack in the bundle. The full packs remain on disk.
const MAX_BUNDLE_SNIPPETS: usize = 10;

/// Snippet texts longer than this are cut and marked.
const MAX_SNIPPET_CHARS: usize = 520;

const TRUNCATION_MARKER: &str = " …";

/// Written to `export/bundle.json` once synthesis finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportBundle {
    pub domain: String,
    pub generated_at: DateTime<Utc>,
    /// Pages fetched by the crawl that produced this evidence.
    pub pages_fetched: usize,
    /// Packs and snippets counted over the full evidence, not the capped
    /// bundle entries.
    pub pack_count: usize,
    pub snippet_count: usize,
    pub packs: Vec<BundlePack>,
    /// Every source URL cited by any pack, sorted and deduplicated.
    pub evidence_urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundlePack {
    pub topic: String,
    pub source_domains: Vec<String>,
    /// Filled in when a summarizer is supplied and its call succeeds;
    /// otherwise stays null.
    pub summary: Option<String>,
    pub snippets: Vec<BundleSnippet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleSnippet {
    pub text: String,
    pub score: f64,
    pub source_url: String,
    pub rank: usize,
}

/// Assembles the bundle from finished evidence packs. Summaries start null;
/// the pipeline fills them in afterwards when a summarizer is available.
pub fn build_bundle(domain: &str, packs: &[EvidencePack], pages_fetched: usize) -> ExportBundle {
    let mut evidence_urls: BTreeSet<String> = BTreeSet::new();
    let mut snippet_count = 0;
    let bundle_packs: Vec<BundlePack> = packs
        .iter()
        .map(|pack| {
            snippet_count += pack.snippets.len();
            for snippet in &pack.snippets {
                evidence_urls.insert(snippet.source_url.clone());
            }
            BundlePack {
                topic: pack.topic.clone(),
                source_domains: pack.source_domains.iter().cloned().collect(),
                summary: None,
                snippets: pack
                    .snippets
                    .iter()
                    .take(MAX_BUNDLE_SNIPPETS)
                    .map(|snippet| BundleSnippet {
                        text: truncate_text(&snippet.text),
                        score: snippet.score,
                        source_url: snippet.source_url.clone(),
                        rank: snippet.rank,
                    })
                    .collect(),
            }
        })
        .collect();

    ExportBundle {
        domain: domain.to_string(),
        generated_at: Utc::now(),
        pages_fetched,
        pack_count: packs.len(),
        snippet_count,
        packs: bundle_packs,
        evidence_urls: evidence_urls.into_iter().collect(),
    }
}

fn truncate_text(text: &str) -> String {
    if text.chars().count() <= MAX_SNIPPET_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(MAX_SNIPPET_CHARS).collect();
    format!("{cut}{TRUNCATION_MARKER}")
}
