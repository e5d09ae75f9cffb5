//! Summarization seam.
//!
//! Narrative summaries come from an external collaborator (typically an LLM
//! service). The pipeline needs exactly one call: topic and snippet texts in,
//! summary string out. A failed call is logged and the pack keeps a null
//! summary; it never invalidates the evidence itself.

use async_trait::async_trait;

use rivalmap_shared::Result;

/// Text-in/text-out summarization contract, invoked once per evidence pack.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, topic: &str, snippet_texts: &[String]) -> Result<String>;
}
