use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::ingest::{count_rows, open_read_only, read_metadata};
use crate::model::IngestRunSummary;

pub fn run(args: StatusArgs) -> Result<()> {
    let manifest_dir = args.cache_root.join("manifests");
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| args.cache_root.join("ria_corpus.sqlite"));

    info!(cache_root = %args.cache_root.display(), "status requested");

    match latest_run_manifest(&manifest_dir)? {
        Some(path) => {
            let raw =
                fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
            let summary: IngestRunSummary = serde_json::from_slice(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?;

            info!(
                path = %path.display(),
                run_id = %summary.run_id.unwrap_or_default(),
                status = %summary.status.unwrap_or_default(),
                updated_at = %summary.updated_at.unwrap_or_default(),
                failure_reason = %summary.failure_reason.unwrap_or_default(),
                failed_articles = summary.failed_article_numbers.len(),
                "loaded latest ingest run manifest"
            );
        }
        None => warn!(path = %manifest_dir.display(), "no ingest run manifest found"),
    }

    if !db_path.exists() {
        warn!(path = %db_path.display(), "database file missing");
        return Ok(());
    }

    let conn = open_read_only(&db_path)?;
    let schema_version = read_metadata(&conn, "db_schema_version")?.unwrap_or_default();
    let last_run_id = read_metadata(&conn, "last_ingest_run_id")?.unwrap_or_default();
    let articles = count_rows(&conn, "SELECT COUNT(*) FROM articles")
        .context("failed to count articles")?;
    let chapters = count_rows(&conn, "SELECT COUNT(*) FROM chapitres")
        .context("failed to count chapters")?;
    let recitals = count_rows(&conn, "SELECT COUNT(*) FROM considerants")
        .context("failed to count recitals")?;
    let annexes = count_rows(&conn, "SELECT COUNT(*) FROM annexes")
        .context("failed to count annexes")?;

    info!(
        path = %db_path.display(),
        schema_version = %schema_version,
        last_run_id = %last_run_id,
        articles,
        chapters,
        recitals,
        annexes,
        "database status"
    );

    for (table, duplicate_rows) in duplicate_rows_by_table(&conn)? {
        if duplicate_rows > 0 {
            warn!(
                table,
                duplicate_rows,
                "table holds repeated keys; ingest with replace-by-number to collapse them"
            );
        }
    }

    Ok(())
}

/// Table name, key column.
const KEYED_TABLES: [(&str, &str); 4] = [
    ("articles", "numero"),
    ("chapitres", "label"),
    ("considerants", "numero"),
    ("annexes", "label"),
];

/// Rows beyond the first for each repeated key, per table.
fn duplicate_rows_by_table(conn: &Connection) -> Result<Vec<(&'static str, i64)>> {
    KEYED_TABLES
        .iter()
        .map(|(table, key)| -> Result<(&'static str, i64)> {
            let sql = format!("SELECT COUNT(*) - COUNT(DISTINCT {key}) FROM {table}");
            let duplicates = count_rows(conn, &sql)
                .with_context(|| format!("failed to count duplicate keys in {table}"))?;
            Ok((*table, duplicates))
        })
        .collect()
}

/// Run manifests are named `ingest_run_<UTC compact>.json`, so the
/// lexicographically greatest name is the most recent run.
fn latest_run_manifest(manifest_dir: &Path) -> Result<Option<PathBuf>> {
    if !manifest_dir.exists() {
        return Ok(None);
    }

    let entries = fs::read_dir(manifest_dir)
        .with_context(|| format!("failed to read {}", manifest_dir.display()))?;

    let mut latest: Option<PathBuf> = None;
    for entry in entries {
        let entry = entry
            .with_context(|| format!("failed to read entry in {}", manifest_dir.display()))?;
        let path = entry.path();

        let is_run_manifest = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with("ingest_run_") && name.ends_with(".json"))
            .unwrap_or(false);

        if is_run_manifest && latest.as_ref().is_none_or(|current| path > *current) {
            latest = Some(path);
        }
    }

    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::ingest::{ArticleStore, CorpusRow, SqliteArticleStore};
    use crate::model::{ArticleRecord, ChapterRecord};

    #[test]
    fn latest_run_manifest_picks_newest_timestamp() {
        let dir = tempfile::tempdir().expect("temp dir");
        for name in [
            "ingest_run_20240101T000000Z.json",
            "ingest_run_20250301T120000Z.json",
            "source_notes.json",
        ] {
            fs::write(dir.path().join(name), "{}").expect("write manifest");
        }

        let latest = latest_run_manifest(dir.path())
            .expect("scan manifests")
            .expect("manifest present");
        assert!(latest.ends_with("ingest_run_20250301T120000Z.json"));
    }

    fn seeded_store() -> SqliteArticleStore {
        let connection = Connection::open_in_memory().expect("in-memory db");
        let mut store = SqliteArticleStore::from_connection(connection, ":memory:".to_string())
            .expect("schema");
        let article = ArticleRecord {
            number: 1,
            title: "Objet".to_string(),
            content: "Texte".to_string(),
            chapter_id: Some("I".to_string()),
            section_id: None,
        };
        let chapter = ChapterRecord {
            label: "I".to_string(),
            ordinal: Some(1),
            heading: "CHAPITRE I".to_string(),
            title: "DISPOSITIONS GÉNÉRALES".to_string(),
        };
        for _ in 0..2 {
            store.insert_article(&article).expect("article");
            store.insert_row(CorpusRow::Chapter(&chapter)).expect("chapter");
        }
        store
    }

    #[test]
    fn duplicate_rows_by_table_counts_repeated_keys() {
        let store = seeded_store();
        let duplicates = duplicate_rows_by_table(store.connection()).expect("counts");

        assert_eq!(
            duplicates,
            vec![
                ("articles", 1),
                ("chapitres", 1),
                ("considerants", 0),
                ("annexes", 0)
            ]
        );
    }

    #[test]
    fn run_fails_when_a_corpus_table_cannot_be_read() {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("partial.sqlite");
        let connection = Connection::open(&db_path).expect("create db");
        connection
            .execute_batch(
                "CREATE TABLE metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL);",
            )
            .expect("metadata table");
        drop(connection);

        let err = run(StatusArgs {
            cache_root: dir.path().to_path_buf(),
            db_path: Some(db_path),
        })
        .expect_err("missing articles table must surface");
        assert!(format!("{err:#}").contains("failed to count articles"));
    }

    #[test]
    fn latest_run_manifest_handles_missing_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let missing = dir.path().join("manifests");
        assert!(latest_run_manifest(&missing).expect("scan").is_none());
    }
}
