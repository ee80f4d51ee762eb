use serde::{Deserialize, Serialize};

/// One article of the regulation, as extracted from the source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub number: u32,
    pub title: String,
    pub content: String,
    pub chapter_id: Option<String>,
    pub section_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub label: String,
    pub ordinal: Option<u32>,
    pub heading: String,
    pub title: String,
}

/// One numbered recital ("considérant") of the preamble.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecitalRecord {
    pub number: u32,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnexRecord {
    pub label: String,
    pub ordinal: Option<u32>,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedNode {
    pub node_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestionReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failed_numbers: Vec<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceDocument {
    pub origin: String,
    pub cached_path: String,
    pub sha256: String,
    pub byte_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestPaths {
    pub cache_root: String,
    pub manifest_dir: String,
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestCounts {
    pub articles_found: usize,
    pub articles_skipped: usize,
    pub articles_attempted: usize,
    pub articles_succeeded: usize,
    pub articles_failed: usize,
    pub chapters_found: usize,
    pub chapters_succeeded: usize,
    pub chapters_failed: usize,
    pub recitals_found: usize,
    pub recitals_succeeded: usize,
    pub recitals_failed: usize,
    pub annexes_found: usize,
    pub annexes_succeeded: usize,
    pub annexes_failed: usize,
    pub articles_total: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub db_schema_version: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub duplicate_policy: String,
    pub dry_run: bool,
    pub failure_reason: Option<String>,
    pub paths: IngestPaths,
    pub source: Option<SourceDocument>,
    pub counts: IngestCounts,
    pub failed_article_numbers: Vec<u32>,
    pub failed_rows: Vec<String>,
    pub skipped_nodes: Vec<SkippedNode>,
    pub warnings: Vec<String>,
}

/// The subset of a run manifest that `status` reads back.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRunSummary {
    pub run_id: Option<String>,
    pub status: Option<String>,
    pub updated_at: Option<String>,
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub failed_article_numbers: Vec<u32>,
}
