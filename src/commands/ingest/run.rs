use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};
use ureq::Agent;

use crate::cli::{DuplicatePolicy, IngestArgs};
use crate::model::{
    AnnexRecord, ArticleRecord, ChapterRecord, IngestCounts, IngestPaths, IngestRunManifest,
    IngestionReport, RecitalRecord,
};
use crate::util::{ensure_directory, now_utc_string, utc_compact_string, write_json_pretty};

use super::engine::{IngestError, RowReport, WriteProgress, ingest, ingest_rows};
use super::fetch::{build_agent, cache_source_document, fetch_document, read_local_document};
use super::store::{CorpusRow, DB_SCHEMA_VERSION, RowKind, SqliteArticleStore, count_rows};
use super::structure::{
    DocumentSelectors, extract_annexes, extract_chapters, extract_recitals, parse_document,
    scan_articles,
};

/// How a run that did not hit a fatal error ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Clean,
    PartialFailures,
}

impl RunStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Clean => "completed",
            Self::PartialFailures => "completed_with_failures",
        }
    }
}

struct CorpusParts<'a> {
    articles: &'a [ArticleRecord],
    chapters: &'a [ChapterRecord],
    recitals: &'a [RecitalRecord],
    annexes: &'a [AnnexRecord],
}

/// Per-stage reports, filled in as each stage finishes so a fatal error
/// still leaves the finished stages on record.
#[derive(Debug, Default)]
pub(super) struct CorpusWrite {
    articles: IngestionReport,
    chapters: RowReport,
    recitals: RowReport,
    annexes: RowReport,
    articles_total: Option<i64>,
}

impl CorpusWrite {
    fn rows_mut(&mut self, kind: RowKind) -> &mut RowReport {
        match kind {
            RowKind::Chapter => &mut self.chapters,
            RowKind::Recital => &mut self.recitals,
            RowKind::Annex => &mut self.annexes,
        }
    }

    pub(super) fn record_progress(&mut self, progress: &WriteProgress) {
        match progress {
            WriteProgress::Schema => {}
            WriteProgress::Articles(report) => self.articles = report.clone(),
            WriteProgress::Rows { kind, report } => *self.rows_mut(*kind) = report.clone(),
        }
    }

    fn has_failures(&self) -> bool {
        self.articles.failed > 0
            || self.chapters.failed > 0
            || self.recitals.failed > 0
            || self.annexes.failed > 0
    }

    pub(super) fn apply_to(&self, manifest: &mut IngestRunManifest) {
        let counts = &mut manifest.counts;
        counts.articles_attempted = self.articles.attempted;
        counts.articles_succeeded = self.articles.succeeded;
        counts.articles_failed = self.articles.failed;
        counts.chapters_succeeded = self.chapters.succeeded;
        counts.chapters_failed = self.chapters.failed;
        counts.recitals_succeeded = self.recitals.succeeded;
        counts.recitals_failed = self.recitals.failed;
        counts.annexes_succeeded = self.annexes.succeeded;
        counts.annexes_failed = self.annexes.failed;
        counts.articles_total = self.articles_total;

        manifest.failed_article_numbers = self.articles.failed_numbers.clone();
        manifest.failed_rows = [&self.recitals, &self.chapters, &self.annexes]
            .into_iter()
            .flat_map(|report| report.failed_rows.iter().cloned())
            .collect();
    }
}

pub fn run(args: IngestArgs) -> Result<RunStatus> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let cache_root = args.cache_root.clone();
    let manifest_dir = cache_root.join("manifests");
    ensure_directory(&manifest_dir)?;

    let ingest_manifest_path = args.ingest_manifest_path.clone().unwrap_or_else(|| {
        manifest_dir.join(format!(
            "ingest_run_{}.json",
            utc_compact_string(started_ts)
        ))
    });
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| cache_root.join("ria_corpus.sqlite"));

    info!(cache_root = %cache_root.display(), run_id = %run_id, "starting ingest");

    let agent = build_agent();
    let (origin, html) = acquire_document(&args, &agent)?;
    let source = cache_source_document(&cache_root, &origin, &html)?;

    let selectors = DocumentSelectors::new()?;
    let document = parse_document(&html);
    let scan = scan_articles(&document, &selectors);
    let chapters = if args.skip_chapters {
        Vec::new()
    } else {
        extract_chapters(&document, &selectors)
    };
    let recitals = if args.skip_recitals {
        Vec::new()
    } else {
        extract_recitals(&document, &selectors)
    };
    let annexes = if args.skip_annexes {
        Vec::new()
    } else {
        extract_annexes(&document, &selectors)
    };

    for skipped in &scan.skipped {
        warn!(node_id = %skipped.node_id, reason = %skipped.reason, "article node skipped");
    }
    if scan.found() == 0 {
        warn!(origin = %origin, "no article nodes found in source document");
    }
    info!(
        found = scan.found(),
        extracted = scan.records.len(),
        skipped = scan.skipped.len(),
        chapters = chapters.len(),
        recitals = recitals.len(),
        annexes = annexes.len(),
        "extraction finished"
    );

    let mut manifest = IngestRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        db_schema_version: DB_SCHEMA_VERSION.to_string(),
        status: "dry_run".to_string(),
        started_at,
        updated_at: now_utc_string(),
        duplicate_policy: args.duplicate_policy.as_str().to_string(),
        dry_run: args.dry_run,
        failure_reason: None,
        paths: IngestPaths {
            cache_root: cache_root.display().to_string(),
            manifest_dir: manifest_dir.display().to_string(),
            db_path: (!args.dry_run).then(|| db_path.display().to_string()),
        },
        source: Some(source),
        counts: IngestCounts {
            articles_found: scan.found(),
            articles_skipped: scan.skipped.len(),
            chapters_found: chapters.len(),
            recitals_found: recitals.len(),
            annexes_found: annexes.len(),
            ..IngestCounts::default()
        },
        failed_article_numbers: Vec::new(),
        failed_rows: Vec::new(),
        skipped_nodes: scan.skipped.clone(),
        warnings: Vec::new(),
    };
    if scan.found() == 0 {
        manifest
            .warnings
            .push("source document contained no article nodes".to_string());
    }

    if args.dry_run {
        write_json_pretty(&ingest_manifest_path, &manifest)?;
        info!(path = %ingest_manifest_path.display(), "dry run: store left untouched");
        return Ok(RunStatus::Clean);
    }

    let parts = CorpusParts {
        articles: &scan.records,
        chapters: &chapters,
        recitals: &recitals,
        annexes: &annexes,
    };
    let mut written = CorpusWrite::default();
    let outcome = write_corpus(
        &db_path,
        &parts,
        args.duplicate_policy,
        &run_id,
        &mut written,
    );
    manifest.updated_at = now_utc_string();

    if let Err(err) = outcome {
        if let Some(IngestError::StoreUnavailable { progress, .. }) =
            err.downcast_ref::<IngestError>()
        {
            written.record_progress(progress);
        }
        written.apply_to(&mut manifest);
        manifest.status = "failed".to_string();
        manifest.failure_reason = Some(format!("{err:#}"));
        write_json_pretty(&ingest_manifest_path, &manifest)?;
        info!(path = %ingest_manifest_path.display(), "wrote failed ingest run manifest");
        return Err(err);
    }

    let status = if written.has_failures() {
        RunStatus::PartialFailures
    } else {
        RunStatus::Clean
    };

    written.apply_to(&mut manifest);
    manifest.status = status.as_str().to_string();

    write_json_pretty(&ingest_manifest_path, &manifest)?;

    info!(path = %ingest_manifest_path.display(), "wrote ingest run manifest");
    info!(
        succeeded = written.articles.succeeded,
        failed = written.articles.failed,
        articles_total = written.articles_total.unwrap_or_default(),
        status = status.as_str(),
        "ingest completed"
    );

    Ok(status)
}

fn acquire_document(args: &IngestArgs, agent: &Agent) -> Result<(String, String)> {
    if let Some(html_path) = &args.html_path {
        let html = read_local_document(html_path)?;
        return Ok((html_path.display().to_string(), html));
    }

    info!(url = %args.source_url, "fetching source document");
    let html = fetch_document(agent, &args.source_url)?;
    Ok((args.source_url.clone(), html))
}

/// Writes the parts in document order: recitals, chapters, articles, annexes.
fn write_corpus(
    db_path: &Path,
    parts: &CorpusParts<'_>,
    policy: DuplicatePolicy,
    run_id: &str,
    written: &mut CorpusWrite,
) -> Result<()> {
    if let Some(parent) = db_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        ensure_directory(parent)?;
    }

    let mut store =
        SqliteArticleStore::open(db_path).map_err(|source| IngestError::StoreUnavailable {
            store: db_path.display().to_string(),
            progress: WriteProgress::Schema,
            source,
        })?;

    if !parts.recitals.is_empty() {
        let rows = parts.recitals.iter().map(CorpusRow::Recital);
        written.recitals = ingest_rows(RowKind::Recital, rows, &mut store, policy)?;
    }
    if !parts.chapters.is_empty() {
        let rows = parts.chapters.iter().map(CorpusRow::Chapter);
        written.chapters = ingest_rows(RowKind::Chapter, rows, &mut store, policy)?;
    }

    info!(
        records = parts.articles.len(),
        policy = policy.as_str(),
        "inserting articles"
    );
    written.articles = ingest(parts.articles, &mut store, policy)?;

    if !parts.annexes.is_empty() {
        let rows = parts.annexes.iter().map(CorpusRow::Annex);
        written.annexes = ingest_rows(RowKind::Annex, rows, &mut store, policy)?;
    }

    store.rebuild_search_index()?;
    store.record_run(run_id)?;
    let articles_total = count_rows(store.connection(), "SELECT COUNT(*) FROM articles")
        .context("failed to count stored articles")?;
    written.articles_total = Some(articles_total);

    Ok(())
}
