//! Paragraph extraction.
//!
//! Turns a fetched [`Page`] into a flat sequence of [`Paragraph`] units with
//! structural roles, ready for topic scoring. Extraction is a pure function of
//! the page content, so the same page always yields the same paragraphs.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::warn;

use rivalmap_shared::types::{Page, Paragraph, ParagraphRole};

pub mod markdown;

pub use markdown::to_markdown;

/// Units shorter than this are fragments (buttons, labels), not prose.
const MIN_PARAGRAPH_CHARS: usize = 80;

/// Headings are short by nature and keep their own, much lower floor.
const MIN_HEADING_CHARS: usize = 3;

/// Subtrees that never contain reader-visible prose.
const SKIP_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg", "iframe"];

/// Containers whose entire contents count as navigational chrome.
const NAV_TAGS: &[&str] = &["nav", "header", "footer", "aside"];

/// Inline elements whose text belongs to the nearest block ancestor.
const INLINE_TAGS: &[&str] = &[
    "a", "abbr", "b", "br", "cite", "code", "em", "i", "img", "mark", "q", "small", "span",
    "strong", "sub", "sup", "time", "u", "wbr",
];

static BOILERPLATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)(",
        r"\bwe use cookies\b",
        r"|\bthis (?:web)?site uses cookies\b",
        r"|\bcookie (?:policy|settings|preferences|consent)\b",
        r"|\baccept (?:all )?cookies\b",
        r"|\bsubscribe to our newsletter\b",
        r"|\bsign up (?:for|to) our newsletter\b",
        r"|\bjoin our (?:newsletter|mailing list)\b",
        r"|\ball rights reserved\b",
        r"|©\s*\d{4}",
        r"|\(c\)\s*\d{4}",
        r"|\btable of contents\b",
        r")",
    ))
    .expect("valid regex")
});

static BLANK_LINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").expect("valid regex"));

pub(crate) static BODY_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").unwrap());

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Splits a page into paragraph units with structural roles.
///
/// HTML pages are walked by block-level element; plain text splits on blank
/// lines. Units are whitespace-collapsed, and anything too short or matching a
/// boilerplate pattern (cookie banners, newsletter prompts, copyright lines)
/// is dropped. `position` is the ordinal of each unit that survives the
/// filters. Malformed content degrades to an empty list rather than an error.
pub fn extract_paragraphs(page: &Page) -> Vec<Paragraph> {
    let paragraphs = if is_html(page) {
        extract_html(page)
    } else {
        extract_plain_text(page)
    };
    if paragraphs.is_empty() {
        warn!(url = %page.url, "no paragraphs extracted");
    }
    paragraphs
}

fn is_html(page: &Page) -> bool {
    match page.content_type.as_deref() {
        Some(ct) => ct.to_ascii_lowercase().contains("html"),
        None => page.raw_content.trim_start().starts_with('<'),
    }
}

fn extract_html(page: &Page) -> Vec<Paragraph> {
    // Html is not Send, so the document never outlives this function.
    let doc = Html::parse_document(&page.raw_content);
    let mut units = Vec::new();
    if let Some(body) = doc.select(&BODY_SELECTOR).next() {
        walk_element(body, false, &mut units);
    }

    let mut paragraphs = Vec::new();
    for (text, role) in units {
        if !keep_unit(&text, role) {
            continue;
        }
        paragraphs.push(Paragraph {
            source_url: page.url.clone(),
            text,
            position: paragraphs.len(),
            role,
        });
    }
    paragraphs
}

fn extract_plain_text(page: &Page) -> Vec<Paragraph> {
    let mut paragraphs = Vec::new();
    for chunk in BLANK_LINE_RE.split(&page.raw_content) {
        let text = collapse_whitespace(chunk);
        if !keep_unit(&text, ParagraphRole::Body) {
            continue;
        }
        paragraphs.push(Paragraph {
            source_url: page.url.clone(),
            text,
            position: paragraphs.len(),
            role: ParagraphRole::Body,
        });
    }
    paragraphs
}

/// Depth-first walk emitting one unit per block element that owns text.
///
/// A block's own text stops at nested block boundaries, so a `<div>` holding
/// an intro sentence and a `<p>` yields two separate units. Everything under a
/// navigational container keeps the `Nav` role regardless of its own tag.
fn walk_element(el: ElementRef<'_>, in_nav: bool, out: &mut Vec<(String, ParagraphRole)>) {
    let tag = el.value().name();
    if SKIP_TAGS.contains(&tag) {
        return;
    }
    let in_nav = in_nav || NAV_TAGS.contains(&tag);
    let explicit = role_for_tag(tag);
    if explicit.is_some() || !INLINE_TAGS.contains(&tag) {
        let text = own_text(el);
        if !text.is_empty() {
            let role = if in_nav {
                ParagraphRole::Nav
            } else {
                explicit.unwrap_or(ParagraphRole::Other)
            };
            out.push((text, role));
        }
    }
    for child in el.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            walk_element(child_el, in_nav, out);
        }
    }
}

fn role_for_tag(tag: &str) -> Option<ParagraphRole> {
    match tag {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => Some(ParagraphRole::Heading),
        "p" | "blockquote" => Some(ParagraphRole::Body),
        "li" => Some(ParagraphRole::ListItem),
        _ => None,
    }
}

/// Text belonging to this element: its direct text nodes plus text reached
/// through inline descendants, stopping at any nested block or skipped tag.
fn own_text(el: ElementRef<'_>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    collect_inline_text(el, &mut parts);
    collapse_whitespace(&parts.concat())
}

fn collect_inline_text<'a>(el: ElementRef<'a>, out: &mut Vec<&'a str>) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push(text);
        } else if let Some(child_el) = ElementRef::wrap(child) {
            if INLINE_TAGS.contains(&child_el.value().name()) {
                collect_inline_text(child_el, out);
            }
        }
    }
}

fn keep_unit(text: &str, role: ParagraphRole) -> bool {
    let min_chars = match role {
        ParagraphRole::Heading => MIN_HEADING_CHARS,
        _ => MIN_PARAGRAPH_CHARS,
    };
    text.chars().count() >= min_chars && !BOILERPLATE_RE.is_match(text)
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod extract_tests {
    use chrono::Utc;

    use super::*;

    const LONG_BODY: &str = "The ingestion layer batches incoming change events and applies them to \
                             the columnar store in configurable windows, trading freshness for \
                             write amplification.";

    fn page(content_type: Option<&str>, raw_content: &str) -> Page {
        Page {
            url: "https://example.com/docs".to_string(),
            title: None,
            fetched_at: Utc::now(),
            http_status: 200,
            content_type: content_type.map(str::to_string),
            content_hash: String::new(),
            depth: 0,
            links: Vec::new(),
            raw_content: raw_content.to_string(),
        }
    }

    fn roles(paragraphs: &[Paragraph]) -> Vec<ParagraphRole> {
        paragraphs.iter().map(|p| p.role).collect()
    }

    #[test]
    fn roles_follow_document_structure() {
        let html = format!(
            "<html><body>\
             <h1>Platform overview</h1>\
             <p>{LONG_BODY}</p>\
             <ul><li>{LONG_BODY}</li></ul>\
             <blockquote>{LONG_BODY}</blockquote>\
             </body></html>"
        );
        let paragraphs = extract_paragraphs(&page(Some("text/html"), &html));
        assert_eq!(
            roles(&paragraphs),
            vec![
                ParagraphRole::Heading,
                ParagraphRole::Body,
                ParagraphRole::ListItem,
                ParagraphRole::Body,
            ]
        );
        assert_eq!(paragraphs[0].text, "Platform overview");
    }

    #[test]
    fn nav_containers_override_inner_roles() {
        let html = format!(
            "<html><body>\
             <nav><ul><li>{LONG_BODY}</li></ul></nav>\
             <footer><p>{LONG_BODY}</p></footer>\
             <p>{LONG_BODY}</p>\
             </body></html>"
        );
        let paragraphs = extract_paragraphs(&page(Some("text/html"), &html));
        assert_eq!(
            roles(&paragraphs),
            vec![ParagraphRole::Nav, ParagraphRole::Nav, ParagraphRole::Body]
        );
    }

    #[test]
    fn short_units_are_dropped_but_headings_survive() {
        let html = format!(
            "<html><body>\
             <h2>Pricing</h2>\
             <p>Too short.</p>\
             <p>{LONG_BODY}</p>\
             </body></html>"
        );
        let paragraphs = extract_paragraphs(&page(Some("text/html"), &html));
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[0].text, "Pricing");
        assert_eq!(paragraphs[0].role, ParagraphRole::Heading);
        assert_eq!(paragraphs[1].role, ParagraphRole::Body);
    }

    #[test]
    fn boilerplate_units_are_discarded() {
        let html = format!(
            "<html><body>\
             <p>We use cookies to personalise content, serve advertising, and analyse our \
             traffic across every property that we operate worldwide.</p>\
             <p>Subscribe to our newsletter and never miss a product launch, webinar, or \
             customer story from the team building the platform.</p>\
             <p>Copyright © 2025 Example Corp. All rights reserved worldwide, including \
             every subsidiary listed in the annual report.</p>\
             <h2>Table of contents</h2>\
             <p>{LONG_BODY}</p>\
             </body></html>"
        );
        let paragraphs = extract_paragraphs(&page(Some("text/html"), &html));
        assert_eq!(paragraphs.len(), 1);
        assert!(paragraphs[0].text.contains("ingestion layer"));
    }

    #[test]
    fn script_and_style_subtrees_are_never_visited() {
        let html = format!(
            "<html><body>\
             <script>var analyticsPayload = \"this string is well over eighty characters \
             long and would otherwise pass the minimum length filter easily\";</script>\
             <style>.hero {{ background: url(banner.png); padding: 4rem 2rem 4rem 2rem; }}</style>\
             <template><p>{LONG_BODY}</p></template>\
             <p>{LONG_BODY}</p>\
             </body></html>"
        );
        let paragraphs = extract_paragraphs(&page(Some("text/html"), &html));
        assert_eq!(paragraphs.len(), 1);
        assert!(!paragraphs[0].text.contains("analyticsPayload"));
    }

    #[test]
    fn whitespace_is_collapsed() {
        let html = "<html><body><p>Events   are\n\tbatched\n and     applied to the columnar \
                    store in windows, trading freshness for write amplification.</p></body></html>";
        let paragraphs = extract_paragraphs(&page(Some("text/html"), html));
        assert_eq!(paragraphs.len(), 1);
        assert!(paragraphs[0].text.starts_with("Events are batched and applied"));
    }

    #[test]
    fn inline_markup_stays_in_one_unit() {
        let html = "<html><body><p>The <strong>ingestion</strong> layer batches incoming \
                    <a href=\"/docs\">change events</a> and applies them to the columnar store in \
                    configurable windows, trading freshness for write amplification.</p>\
                    </body></html>";
        let paragraphs = extract_paragraphs(&page(Some("text/html"), html));
        assert_eq!(paragraphs.len(), 1);
        assert!(paragraphs[0].text.contains("ingestion layer batches incoming change events"));
    }

    #[test]
    fn container_text_and_nested_blocks_emit_separate_units() {
        let html = format!(
            "<html><body><div>An introductory sentence that sits directly inside the division \
             element and is comfortably long enough to keep.<p>{LONG_BODY}</p></div></body></html>"
        );
        let paragraphs = extract_paragraphs(&page(Some("text/html"), &html));
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[0].role, ParagraphRole::Other);
        assert_eq!(paragraphs[1].role, ParagraphRole::Body);
    }

    #[test]
    fn positions_count_only_emitted_units() {
        let html = format!(
            "<html><body>\
             <p>Tiny.</p>\
             <p>{LONG_BODY}</p>\
             <p>Also tiny.</p>\
             <p>{LONG_BODY} With an extra clause to distinguish it from the sibling above.</p>\
             </body></html>"
        );
        let paragraphs = extract_paragraphs(&page(Some("text/html"), &html));
        let positions: Vec<usize> = paragraphs.iter().map(|p| p.position).collect();
        assert_eq!(positions, vec![0, 1]);
    }

    #[test]
    fn plain_text_splits_on_blank_lines() {
        let text = format!("{LONG_BODY}\n\n\n{LONG_BODY} Second block with its own tail.\n");
        let paragraphs = extract_paragraphs(&page(Some("text/plain"), &text));
        assert_eq!(paragraphs.len(), 2);
        assert!(paragraphs.iter().all(|p| p.role == ParagraphRole::Body));
        assert_eq!(paragraphs[1].position, 1);
    }

    #[test]
    fn missing_content_type_falls_back_to_sniffing() {
        let html = format!("<html><body><p>{LONG_BODY}</p></body></html>");
        let paragraphs = extract_paragraphs(&page(None, &html));
        assert_eq!(paragraphs.len(), 1);
        assert_eq!(paragraphs[0].role, ParagraphRole::Body);

        let paragraphs = extract_paragraphs(&page(None, LONG_BODY));
        assert_eq!(paragraphs.len(), 1);
    }

    #[test]
    fn empty_or_malformed_content_yields_no_paragraphs() {
        assert!(extract_paragraphs(&page(Some("text/html"), "")).is_empty());
        assert!(extract_paragraphs(&page(Some("text/html"), "<div<<<p///")).is_empty());
        assert!(extract_paragraphs(&page(Some("text/plain"), "\n\n  \n")).is_empty());
    }

    #[test]
    fn extraction_is_deterministic() {
        let html = format!(
            "<html><body><h1>Platform</h1><p>{LONG_BODY}</p><ul><li>{LONG_BODY}</li></ul>\
             </body></html>"
        );
        let p = page(Some("text/html"), &html);
        let first = extract_paragraphs(&p);
        let second = extract_paragraphs(&p);
        assert_eq!(first, second);
    }
}
