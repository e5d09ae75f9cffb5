//! Markdown rendition of fetched pages, used by the export bundle.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use rivalmap_shared::error::{Result, RivalmapError};

use crate::BODY_SELECTOR;

/// Tags dropped wholesale during conversion. Navigational chrome is excluded
/// here too since the rendition should read as the page's main content.
const SKIP_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "iframe", "nav", "header", "footer",
];

/// Candidate containers for the main content region, most specific first.
const CONTENT_SELECTORS: &[&str] = &["main", "article", "[role=\"main\"]", "#content", ".content"];

static EXCESS_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Converts an HTML body into Markdown.
///
/// When a recognizable content container exists, only that region is
/// converted; otherwise the whole `<body>` is. Conversion failures surface as
/// parse errors so the caller can degrade per page.
pub fn to_markdown(html: &str) -> Result<String> {
    let content = extract_content_html(html);
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIP_TAGS.to_vec())
        .build();
    let markdown = converter
        .convert(&content)
        .map_err(|e| RivalmapError::parse(format!("markdown conversion failed: {e}")))?;
    Ok(EXCESS_BLANK_LINES
        .replace_all(markdown.trim(), "\n\n")
        .into_owned())
}

fn extract_content_html(html: &str) -> String {
    let doc = Html::parse_document(html);
    for selector in CONTENT_SELECTORS {
        let sel = Selector::parse(selector).unwrap();
        if let Some(el) = doc.select(&sel).next() {
            if !el.text().collect::<String>().trim().is_empty() {
                return el.html();
            }
        }
    }
    match doc.select(&BODY_SELECTOR).next() {
        Some(body) => body.inner_html(),
        None => html.to_string(),
    }
}

#[cfg(test)]
mod markdown_tests {
    use super::*;

    #[test]
    fn converts_headings_and_paragraphs() {
        let html = "<html><body><h1>Platform</h1><p>Batching trades freshness for write \
                    amplification.</p></body></html>";
        let md = to_markdown(html).unwrap();
        assert!(md.contains("# Platform"));
        assert!(md.contains("Batching trades freshness"));
    }

    #[test]
    fn prefers_the_main_content_region() {
        let html = "<html><body>\
                    <div class=\"sidebar\">Unrelated navigation column text.</div>\
                    <main><h2>Integrations</h2><p>Connectors sync nightly.</p></main>\
                    </body></html>";
        let md = to_markdown(html).unwrap();
        assert!(md.contains("Integrations"));
        assert!(!md.contains("Unrelated navigation"));
    }

    #[test]
    fn skips_script_and_chrome_tags() {
        let html = "<html><body>\
                    <nav>Home Pricing Docs</nav>\
                    <script>var x = 1;</script>\
                    <p>Visible prose.</p>\
                    </body></html>";
        let md = to_markdown(html).unwrap();
        assert!(md.contains("Visible prose."));
        assert!(!md.contains("var x"));
        assert!(!md.contains("Home Pricing"));
    }

    #[test]
    fn falls_back_to_the_whole_body() {
        let html = "<html><body><div><p>No content landmark on this page.</p></div></body></html>";
        let md = to_markdown(html).unwrap();
        assert!(md.contains("No content landmark"));
    }

    #[test]
    fn squeezes_runs_of_blank_lines() {
        let html = "<html><body><main><p>First.</p><div></div><div></div><p>Second.</p></main>\
                    </body></html>";
        let md = to_markdown(html).unwrap();
        assert!(!md.contains("\n\n\n"));
    }
}
