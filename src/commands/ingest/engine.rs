use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cli::DuplicatePolicy;
use crate::model::{ArticleRecord, IngestionReport};

use super::store::{ArticleStore, CorpusRow, RowKind, StoreError};

#[derive(Debug, Error)]
pub(crate) enum IngestError {
    /// The store could not be reached. Rows written before the failure stay
    /// in place; `progress` tells how far the interrupted stage got.
    #[error("store {store} became unavailable while writing {progress}")]
    StoreUnavailable {
        store: String,
        progress: WriteProgress,
        #[source]
        source: StoreError,
    },
}

/// Partial report of the stage a fatal store error interrupted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WriteProgress {
    /// The store failed while being opened, before any row was written.
    Schema,
    Articles(IngestionReport),
    Rows { kind: RowKind, report: RowReport },
}

impl WriteProgress {
    pub(crate) fn stage(&self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::Articles(_) => "articles",
            Self::Rows { kind, .. } => kind.plural(),
        }
    }

    pub(crate) fn succeeded(&self) -> usize {
        match self {
            Self::Schema => 0,
            Self::Articles(report) => report.succeeded,
            Self::Rows { report, .. } => report.succeeded,
        }
    }
}

impl fmt::Display for WriteProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} after {} successful writes",
            self.stage(),
            self.succeeded()
        )
    }
}

/// Outcome of writing chapters, recitals or annexes. Failed rows are named
/// the way the store describes them (`chapter III`, `recital 12`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RowReport {
    pub(crate) attempted: usize,
    pub(crate) succeeded: usize,
    pub(crate) failed: usize,
    pub(crate) failed_rows: Vec<String>,
}

/// Writes `records` one by one in order. A rejected record is logged and
/// counted; a lost connection ends the run.
pub(crate) fn ingest<S>(
    records: &[ArticleRecord],
    store: &mut S,
    policy: DuplicatePolicy,
) -> Result<IngestionReport, IngestError>
where
    S: ArticleStore + ?Sized,
{
    store.check_connection().map_err(|source| {
        unavailable(store, WriteProgress::Articles(IngestionReport::default()), source)
    })?;

    let mut report = IngestionReport::default();
    for record in records {
        report.attempted += 1;

        let result = match policy {
            DuplicatePolicy::Append => store.insert_article(record),
            DuplicatePolicy::ReplaceByNumber => store.replace_article(record),
        };

        match result {
            Ok(()) => {
                report.succeeded += 1;
                debug!(numero = record.number, "article inserted");
            }
            Err(err) if err.is_connection() => {
                return Err(unavailable(store, WriteProgress::Articles(report), err));
            }
            Err(err) => {
                report.failed += 1;
                report.failed_numbers.push(record.number);
                warn!(
                    numero = record.number,
                    error = %err,
                    detail = %err.detail(),
                    "article insert failed"
                );
            }
        }
    }

    info!(
        attempted = report.attempted,
        succeeded = report.succeeded,
        failed = report.failed,
        "article ingestion finished"
    );

    Ok(report)
}

/// Same isolation as [`ingest`] for the rows stored beside the articles.
/// Under `replace-by-number` each row replaces the stored rows sharing its key.
pub(crate) fn ingest_rows<'a, S, I>(
    kind: RowKind,
    rows: I,
    store: &mut S,
    policy: DuplicatePolicy,
) -> Result<RowReport, IngestError>
where
    S: ArticleStore + ?Sized,
    I: IntoIterator<Item = CorpusRow<'a>>,
{
    store.check_connection().map_err(|source| {
        let progress = WriteProgress::Rows {
            kind,
            report: RowReport::default(),
        };
        unavailable(store, progress, source)
    })?;

    let mut report = RowReport::default();
    for row in rows {
        report.attempted += 1;

        let result = match policy {
            DuplicatePolicy::Append => store.insert_row(row),
            DuplicatePolicy::ReplaceByNumber => store.replace_row(row),
        };

        match result {
            Ok(()) => report.succeeded += 1,
            Err(err) if err.is_connection() => {
                return Err(unavailable(store, WriteProgress::Rows { kind, report }, err));
            }
            Err(err) => {
                report.failed += 1;
                report.failed_rows.push(row.describe());
                warn!(
                    row = %row.describe(),
                    error = %err,
                    detail = %err.detail(),
                    "row insert failed"
                );
            }
        }
    }

    info!(
        rows = kind.plural(),
        attempted = report.attempted,
        succeeded = report.succeeded,
        failed = report.failed,
        "row ingestion finished"
    );

    Ok(report)
}

fn unavailable<S>(store: &S, progress: WriteProgress, source: StoreError) -> IngestError
where
    S: ArticleStore + ?Sized,
{
    IngestError::StoreUnavailable {
        store: store.describe(),
        progress,
        source,
    }
}
