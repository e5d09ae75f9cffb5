//! Run directories and JSONL record streams.
//!
//! Every pipeline stage persists its output as an append-only sequence of
//! newline-delimited JSON records, one object per line, so a run can be
//! inspected or resumed stage-by-stage. A run lives under
//! `<out_root>/<slug>/` with `crawl/`, `scored/`, `evidence/`, and `export/`
//! subdirectories plus a `manifest.json` tracking stage completion.

mod manifest;

pub use manifest::{
    RunManifest, STAGE_BUNDLE, STAGE_CRAWL, STAGE_SCORE, STAGE_SYNTHESIZE, STAGE_TRIM,
    StageStatus,
};

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use rivalmap_shared::{Result, RivalmapError};

// ---------------------------------------------------------------------------
// Run directory layout
// ---------------------------------------------------------------------------

/// Reduce a domain or name to a filesystem-safe slug: lowercase, runs of
/// non-alphanumerics collapsed to single hyphens.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_hyphen = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_hyphen = false;
        } else if !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() { "run".into() } else { slug }
}

/// Filesystem layout for one run.
#[derive(Debug, Clone)]
pub struct RunStore {
    root: PathBuf,
}

impl RunStore {
    /// Open (creating if needed) the run directory for `domain` under `out_root`.
    pub fn open(out_root: impl AsRef<Path>, domain: &str) -> Result<Self> {
        let root = out_root.as_ref().join(slugify(domain));
        for sub in ["crawl", "scored", "evidence", "export", "export/pages"] {
            let dir = root.join(sub);
            fs::create_dir_all(&dir).map_err(|e| RivalmapError::io(&dir, e))?;
        }
        debug!(root = %root.display(), "run store ready");
        Ok(Self { root })
    }

    /// Run root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `crawl/pages.jsonl`: one fetched page per line.
    pub fn pages_path(&self) -> PathBuf {
        self.root.join("crawl/pages.jsonl")
    }

    /// `crawl/urls.jsonl`: the frontier audit trail.
    pub fn urls_path(&self) -> PathBuf {
        self.root.join("crawl/urls.jsonl")
    }

    /// `scored/scored.jsonl`: scored paragraphs above the noise floor.
    pub fn scored_path(&self) -> PathBuf {
        self.root.join("scored/scored.jsonl")
    }

    /// `scored/snippets.jsonl`: trimmed top snippets per topic.
    pub fn snippets_path(&self) -> PathBuf {
        self.root.join("scored/snippets.jsonl")
    }

    /// `evidence/packs.jsonl`: evidence packs.
    pub fn packs_path(&self) -> PathBuf {
        self.root.join("evidence/packs.jsonl")
    }

    /// `export/bundle.json`: the export collaborator's input.
    pub fn bundle_path(&self) -> PathBuf {
        self.root.join("export/bundle.json")
    }

    /// `export/pages/`: Markdown renditions of the pages the bundle cites.
    pub fn page_markdown_dir(&self) -> PathBuf {
        self.root.join("export/pages")
    }

    /// Rendition path for one page, keyed by URL slug plus a content hash
    /// prefix so distinct pages with colliding slugs stay apart.
    pub fn page_markdown_path(&self, url: &str, content_hash: &str) -> PathBuf {
        let prefix = &content_hash[..content_hash.len().min(12)];
        self.page_markdown_dir()
            .join(format!("{}-{prefix}.md", slugify(url)))
    }

    /// `manifest.json`: run metadata and stage completion.
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.json")
    }
}

// ---------------------------------------------------------------------------
// Record streams
// ---------------------------------------------------------------------------

/// Appends records to a JSONL stream, one JSON object per line.
///
/// Each append is flushed so a crash preserves every record written so far.
/// Creating a writer truncates the stream: an incomplete stage is always
/// recomputed from the start, never half-appended.
pub struct RecordWriter<T> {
    writer: BufWriter<File>,
    path: PathBuf,
    written: usize,
    _marker: PhantomData<T>,
}

impl<T: Serialize> RecordWriter<T> {
    /// Create (truncating) the stream at `path`.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path).map_err(|e| RivalmapError::io(&path, e))?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            written: 0,
            _marker: PhantomData,
        })
    }

    /// Serialize one record and append it as a line.
    pub fn append(&mut self, record: &T) -> Result<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| RivalmapError::Store(format!("serialize record: {e}")))?;
        self.writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.write_all(b"\n"))
            .and_then(|_| self.writer.flush())
            .map_err(|e| RivalmapError::io(&self.path, e))?;
        self.written += 1;
        Ok(())
    }

    /// Number of records appended so far.
    pub fn written(&self) -> usize {
        self.written
    }
}

/// Read every record from a JSONL stream. Blank lines are skipped.
pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = fs::read_to_string(path).map_err(|e| RivalmapError::io(path, e))?;
    let mut records = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record = serde_json::from_str(line).map_err(|e| {
            RivalmapError::Store(format!("{}:{}: bad record: {e}", path.display(), idx + 1))
        })?;
        records.push(record);
    }
    Ok(records)
}
