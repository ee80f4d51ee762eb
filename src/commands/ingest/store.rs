use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, ErrorCode, OpenFlags, params};
use thiserror::Error;

use crate::model::{AnnexRecord, ArticleRecord, ChapterRecord, RecitalRecord};
use crate::util::now_utc_string;

pub(crate) const DB_SCHEMA_VERSION: &str = "0.2.0";

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("store {store} is unreachable")]
    Connection {
        store: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("store rejected {record}")]
    Write {
        record: String,
        #[source]
        source: rusqlite::Error,
    },
}

impl StoreError {
    pub(crate) fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    pub(crate) fn detail(&self) -> String {
        match self {
            Self::Connection { source, .. } | Self::Write { source, .. } => source.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RowKind {
    Chapter,
    Recital,
    Annex,
}

impl RowKind {
    pub(crate) fn plural(self) -> &'static str {
        match self {
            Self::Chapter => "chapters",
            Self::Recital => "recitals",
            Self::Annex => "annexes",
        }
    }
}

/// A row stored next to the articles. Chapters and annexes are keyed by their
/// label, recitals by their number.
#[derive(Debug, Clone, Copy)]
pub(crate) enum CorpusRow<'a> {
    Chapter(&'a ChapterRecord),
    Recital(&'a RecitalRecord),
    Annex(&'a AnnexRecord),
}

impl CorpusRow<'_> {
    pub(crate) fn kind(&self) -> RowKind {
        match self {
            Self::Chapter(_) => RowKind::Chapter,
            Self::Recital(_) => RowKind::Recital,
            Self::Annex(_) => RowKind::Annex,
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Chapter(chapter) => format!("chapter {}", chapter.label),
            Self::Recital(recital) => format!("recital {}", recital.number),
            Self::Annex(annex) => format!("annex {}", annex.label),
        }
    }
}

/// Write side of the article corpus. One handle per ingestion run.
pub(crate) trait ArticleStore {
    /// Human-readable identity of the store, used in fatal errors.
    fn describe(&self) -> String;

    fn check_connection(&mut self) -> Result<(), StoreError>;

    fn insert_article(&mut self, record: &ArticleRecord) -> Result<(), StoreError>;

    /// Removes rows sharing `record.number`, then inserts `record`.
    fn replace_article(&mut self, record: &ArticleRecord) -> Result<(), StoreError>;

    fn insert_row(&mut self, row: CorpusRow<'_>) -> Result<(), StoreError>;

    /// Removes rows sharing the key of `row`, then inserts `row`.
    fn replace_row(&mut self, row: CorpusRow<'_>) -> Result<(), StoreError>;
}

pub(crate) struct SqliteArticleStore {
    connection: Connection,
    location: String,
}

impl SqliteArticleStore {
    pub(crate) fn open(path: &Path) -> Result<Self, StoreError> {
        let location = path.display().to_string();
        let connection = Connection::open(path).map_err(|source| StoreError::Connection {
            store: location.clone(),
            source,
        })?;
        Self::from_connection(connection, location)
    }

    pub(crate) fn from_connection(
        connection: Connection,
        location: String,
    ) -> Result<Self, StoreError> {
        configure_connection(&connection)
            .and_then(|()| ensure_schema(&connection))
            .map_err(|source| StoreError::Connection {
                store: location.clone(),
                source,
            })?;

        Ok(Self {
            connection,
            location,
        })
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.connection
    }

    pub(crate) fn rebuild_search_index(&self) -> Result<()> {
        self.connection
            .execute("INSERT INTO articles_fts(articles_fts) VALUES('rebuild')", [])
            .context("failed to rebuild FTS index")?;
        Ok(())
    }

    pub(crate) fn record_run(&self, run_id: &str) -> Result<()> {
        upsert_metadata(&self.connection, "last_ingest_run_id", run_id)
            .context("failed to record ingest run id")?;
        upsert_metadata(&self.connection, "db_updated_at", &now_utc_string())
            .context("failed to record db update time")?;
        Ok(())
    }

    fn classify(&self, record: String, source: rusqlite::Error) -> StoreError {
        if is_connection_failure(&source) {
            StoreError::Connection {
                store: self.location.clone(),
                source,
            }
        } else {
            StoreError::Write { record, source }
        }
    }
}

impl ArticleStore for SqliteArticleStore {
    fn describe(&self) -> String {
        format!("sqlite:{}", self.location)
    }

    fn check_connection(&mut self) -> Result<(), StoreError> {
        self.connection
            .query_row("SELECT COUNT(*) FROM articles", [], |row| row.get::<_, i64>(0))
            .map(|_| ())
            .map_err(|source| StoreError::Connection {
                store: self.location.clone(),
                source,
            })
    }

    fn insert_article(&mut self, record: &ArticleRecord) -> Result<(), StoreError> {
        insert_article_row(&self.connection, record)
            .map_err(|source| self.classify(format!("article {}", record.number), source))
    }

    fn replace_article(&mut self, record: &ArticleRecord) -> Result<(), StoreError> {
        let result = self.connection.transaction().and_then(|tx| {
            tx.execute("DELETE FROM articles WHERE numero = ?1", [record.number])?;
            insert_article_row(&tx, record)?;
            tx.commit()
        });

        result.map_err(|source| self.classify(format!("article {}", record.number), source))
    }

    fn insert_row(&mut self, row: CorpusRow<'_>) -> Result<(), StoreError> {
        insert_corpus_row(&self.connection, row)
            .map_err(|source| self.classify(row.describe(), source))
    }

    fn replace_row(&mut self, row: CorpusRow<'_>) -> Result<(), StoreError> {
        let result = self.connection.transaction().and_then(|tx| {
            delete_corpus_row(&tx, row)?;
            insert_corpus_row(&tx, row)?;
            tx.commit()
        });

        result.map_err(|source| self.classify(row.describe(), source))
    }
}

fn insert_corpus_row(connection: &Connection, row: CorpusRow<'_>) -> rusqlite::Result<()> {
    match row {
        CorpusRow::Chapter(chapter) => connection.execute(
            "INSERT INTO chapitres(numero, label, titre) VALUES(?1, ?2, ?3)",
            params![chapter.ordinal, &chapter.label, &chapter.title],
        )?,
        CorpusRow::Recital(recital) => connection.execute(
            "INSERT INTO considerants(numero, contenu) VALUES(?1, ?2)",
            params![recital.number, &recital.content],
        )?,
        CorpusRow::Annex(annex) => connection.execute(
            "INSERT INTO annexes(numero, label, titre, contenu) VALUES(?1, ?2, ?3, ?4)",
            params![annex.ordinal, &annex.label, &annex.title, &annex.content],
        )?,
    };
    Ok(())
}

fn delete_corpus_row(connection: &Connection, row: CorpusRow<'_>) -> rusqlite::Result<()> {
    match row {
        CorpusRow::Chapter(chapter) => {
            connection.execute("DELETE FROM chapitres WHERE label = ?1", [&chapter.label])?
        }
        CorpusRow::Recital(recital) => {
            connection.execute("DELETE FROM considerants WHERE numero = ?1", [recital.number])?
        }
        CorpusRow::Annex(annex) => {
            connection.execute("DELETE FROM annexes WHERE label = ?1", [&annex.label])?
        }
    };
    Ok(())
}

fn insert_article_row(connection: &Connection, record: &ArticleRecord) -> rusqlite::Result<()> {
    connection.execute(
        "
        INSERT INTO articles(numero, titre, contenu, chapitre_id, section_id)
        VALUES(?1, ?2, ?3, ?4, ?5)
        ",
        params![
            record.number,
            &record.title,
            &record.content,
            &record.chapter_id,
            &record.section_id
        ],
    )?;
    Ok(())
}

fn is_connection_failure(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(
            ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::SystemIoFailure
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::PermissionDenied
        )
    )
}

fn configure_connection(connection: &Connection) -> rusqlite::Result<()> {
    connection.pragma_update(None, "journal_mode", "WAL")?;
    connection.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> rusqlite::Result<()> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS articles (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          numero INTEGER NOT NULL,
          titre TEXT NOT NULL,
          contenu TEXT NOT NULL,
          chapitre_id TEXT,
          section_id TEXT
        );

        CREATE TABLE IF NOT EXISTS chapitres (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          numero INTEGER,
          label TEXT NOT NULL,
          titre TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS considerants (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          numero INTEGER NOT NULL,
          contenu TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS annexes (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          numero INTEGER,
          label TEXT NOT NULL,
          titre TEXT NOT NULL,
          contenu TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_articles_numero ON articles(numero);
        CREATE INDEX IF NOT EXISTS idx_articles_chapitre ON articles(chapitre_id);

        CREATE VIRTUAL TABLE IF NOT EXISTS articles_fts
        USING fts5(titre, contenu, content='articles', content_rowid='id');
        ",
    )?;

    upsert_metadata(connection, "db_schema_version", DB_SCHEMA_VERSION)?;
    Ok(())
}

fn upsert_metadata(connection: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES(?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        params![key, value],
    )?;
    Ok(())
}

/// Opens an existing corpus for lookups; never creates or migrates it.
pub(crate) fn open_read_only(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("failed to open {} read-only", path.display()))
}

pub(crate) fn count_rows(connection: &Connection, sql: &str) -> Result<i64> {
    let count = connection.query_row(sql, [], |row| row.get(0))?;
    Ok(count)
}

pub(crate) fn read_metadata(connection: &Connection, key: &str) -> Result<Option<String>> {
    let mut statement = connection.prepare("SELECT value FROM metadata WHERE key = ?1")?;
    let mut rows = statement.query([key])?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}
