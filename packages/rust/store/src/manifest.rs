//! The `manifest.json` structure stored at the root of each run directory.
//!
//! The manifest records what was asked for (config snapshot) and what has
//! finished (per-stage completion entries). Resume reads it to decide which
//! stages can be replayed from their record streams.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rivalmap_shared::{CURRENT_SCHEMA_VERSION, Result, RivalmapError, RunConfig, RunId};

/// Crawl stage: `crawl/pages.jsonl` + `crawl/urls.jsonl`.
pub const STAGE_CRAWL: &str = "crawl";
/// Scoring stage: `scored/scored.jsonl`.
pub const STAGE_SCORE: &str = "score";
/// Trim stage: `scored/snippets.jsonl`.
pub const STAGE_TRIM: &str = "trim";
/// Synthesis stage: `evidence/packs.jsonl`.
pub const STAGE_SYNTHESIZE: &str = "synthesize";
/// Export bundle stage: `export/bundle.json`.
pub const STAGE_BUNDLE: &str = "bundle";

/// Completion entry for one finished stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageStatus {
    /// When the stage finished.
    pub completed_at: DateTime<Utc>,
    /// Records written to the stage's stream.
    pub records: usize,
}

/// Run metadata persisted as `manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    /// Unique identifier for this run.
    pub run_id: RunId,
    /// Target domain as given by the user.
    pub domain: String,
    /// Seed URL the crawl started from.
    pub seed_url: String,
    /// When the run was first created.
    pub created_at: DateTime<Utc>,
    /// When the manifest was last written.
    pub updated_at: DateTime<Utc>,
    /// Configuration the run was started with.
    pub config: RunConfig,
    /// Completed stages, keyed by stage name.
    #[serde(default)]
    pub stages: BTreeMap<String, StageStatus>,
}

impl RunManifest {
    /// Fresh manifest for a new run.
    pub fn new(domain: &str, seed_url: &str, config: &RunConfig) -> Self {
        let now = Utc::now();
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            run_id: RunId::new(),
            domain: domain.to_string(),
            seed_url: seed_url.to_string(),
            created_at: now,
            updated_at: now,
            config: config.clone(),
            stages: BTreeMap::new(),
        }
    }

    /// Load a manifest, rejecting schema versions newer than this build.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RivalmapError::io(path, e))?;
        let manifest: Self = serde_json::from_str(&content)
            .map_err(|e| RivalmapError::Store(format!("bad manifest {}: {e}", path.display())))?;

        if manifest.schema_version > CURRENT_SCHEMA_VERSION {
            return Err(RivalmapError::validation(format!(
                "manifest schema_version {} not supported (max {})",
                manifest.schema_version, CURRENT_SCHEMA_VERSION
            )));
        }
        Ok(manifest)
    }

    /// Write the manifest to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| RivalmapError::Store(format!("serialize manifest: {e}")))?;
        std::fs::write(path, content).map_err(|e| RivalmapError::io(path, e))
    }

    /// Record a stage as complete with its record count.
    pub fn mark_complete(&mut self, stage: &str, records: usize) {
        let now = Utc::now();
        self.updated_at = now;
        self.stages.insert(
            stage.to_string(),
            StageStatus {
                completed_at: now,
                records,
            },
        );
    }

    /// Whether a stage has a completion entry.
    pub fn is_complete(&self, stage: &str) -> bool {
        self.stages.contains_key(stage)
    }

    /// Record count for a completed stage, if any.
    pub fn records_for(&self, stage: &str) -> Option<usize> {
        self.stages.get(stage).map(|s| s.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn test_root() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rivalmap_test_{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        dir
    }

    #[test]
    fn manifest_roundtrip() {
        let path = test_root().join("manifest.json");
        let mut manifest = RunManifest::new("example.com", "https://example.com/", &RunConfig::default());
        manifest.mark_complete(STAGE_CRAWL, 42);
        manifest.save(&path).expect("save");

        let loaded = RunManifest::load(&path).expect("load");
        assert_eq!(loaded.domain, "example.com");
        assert_eq!(loaded.config.page_budget, 100);
        assert!(loaded.is_complete(STAGE_CRAWL));
        assert!(!loaded.is_complete(STAGE_SCORE));
        assert_eq!(loaded.records_for(STAGE_CRAWL), Some(42));
    }

    #[test]
    fn manifest_rejects_newer_schema() {
        let path = test_root().join("manifest.json");
        let mut manifest = RunManifest::new("example.com", "https://example.com/", &RunConfig::default());
        manifest.schema_version = CURRENT_SCHEMA_VERSION + 1;
        manifest.save(&path).expect("save");

        let err = RunManifest::load(&path).expect_err("newer schema");
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn mark_complete_overwrites() {
        let mut manifest = RunManifest::new("example.com", "https://example.com/", &RunConfig::default());
        manifest.mark_complete(STAGE_TRIM, 10);
        manifest.mark_complete(STAGE_TRIM, 12);
        assert_eq!(manifest.records_for(STAGE_TRIM), Some(12));
        assert_eq!(manifest.stages.len(), 1);
    }
}
