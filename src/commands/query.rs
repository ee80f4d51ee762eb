use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, params};
use serde::Serialize;
use tracing::info;

use crate::cli::QueryArgs;
use crate::commands::ingest::open_read_only;

#[derive(Debug, Clone, Serialize)]
struct ArticleHit {
    rank: usize,
    numero: u32,
    titre: String,
    chapitre_id: Option<String>,
    snippet: String,
}

#[derive(Debug, Serialize)]
struct QueryResponse {
    query: String,
    limit: usize,
    chapter_filter: Option<String>,
    returned: usize,
    results: Vec<ArticleHit>,
}

pub fn run(args: QueryArgs) -> Result<()> {
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| args.cache_root.join("ria_corpus.sqlite"));

    if !db_path.exists() {
        bail!("database not found: {} (run `ria ingest` first)", db_path.display());
    }
    if args.query.trim().is_empty() {
        bail!("query text must not be empty");
    }

    let connection = open_read_only(&db_path)?;
    let results = search_articles(
        &connection,
        &args.query,
        args.chapter.as_deref(),
        args.limit,
    )?;

    info!(query = %args.query, returned = results.len(), "query completed");

    if args.json {
        write_json_response(&args, results)
    } else {
        write_text_response(&args.query, &results)
    }
}

/// bm25-ranked full-text matches over article titles and bodies.
fn search_articles(
    connection: &Connection,
    query_text: &str,
    chapter_filter: Option<&str>,
    limit: usize,
) -> Result<Vec<ArticleHit>> {
    let fts_query = to_fts_query(query_text);
    if fts_query.is_empty() {
        return Ok(Vec::new());
    }

    let mut statement = connection
        .prepare(
            "
            SELECT
              a.numero,
              a.titre,
              a.chapitre_id,
              snippet(articles_fts, 1, '[', ']', ' ... ', 18)
            FROM articles_fts
            JOIN articles a ON a.id = articles_fts.rowid
            WHERE
              articles_fts MATCH ?1
              AND (?2 IS NULL OR a.chapitre_id = ?2)
            ORDER BY bm25(articles_fts) ASC, a.numero ASC
            LIMIT ?3
            ",
        )
        .context("failed to prepare article search")?;

    let mut rows = statement.query(params![fts_query, chapter_filter, limit as i64])?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(ArticleHit {
            rank: out.len() + 1,
            numero: row.get(0)?,
            titre: row.get(1)?,
            chapitre_id: row.get(2)?,
            snippet: condense_whitespace(&row.get::<_, String>(3)?),
        });
    }

    Ok(out)
}

fn to_fts_query(query_text: &str) -> String {
    query_text
        .split_whitespace()
        .map(|token| token.replace('"', ""))
        .filter(|token| !token.is_empty())
        .map(|token| format!("\"{token}\""))
        .collect::<Vec<String>>()
        .join(" ")
}

fn condense_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<&str>>().join(" ")
}

fn write_json_response(args: &QueryArgs, results: Vec<ArticleHit>) -> Result<()> {
    let response = QueryResponse {
        query: args.query.clone(),
        limit: args.limit,
        chapter_filter: args.chapter.clone(),
        returned: results.len(),
        results,
    };

    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, &response)
        .context("failed to serialize query json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn write_text_response(query_text: &str, results: &[ArticleHit]) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(output, "Query: {query_text}")?;
    writeln!(output, "Results: {}", results.len())?;

    for hit in results {
        let chapter = hit.chapitre_id.as_deref().unwrap_or("-");
        writeln!(
            output,
            "{}.\tArticle {}\tchapitre {}\t{}",
            hit.rank, hit.numero, chapter, hit.titre
        )?;
        writeln!(output, "\tsnippet: {}", hit.snippet)?;
    }

    output.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::ingest::{ArticleStore, SqliteArticleStore};
    use crate::model::ArticleRecord;

    fn article(number: u32, title: &str, content: &str, chapter: &str) -> ArticleRecord {
        ArticleRecord {
            number,
            title: title.to_string(),
            content: content.to_string(),
            chapter_id: Some(chapter.to_string()),
            section_id: None,
        }
    }

    fn seeded_store() -> SqliteArticleStore {
        let connection = Connection::open_in_memory().expect("in-memory db");
        let mut store = SqliteArticleStore::from_connection(connection, ":memory:".to_string())
            .expect("schema");

        for record in [
            article(
                3,
                "Définitions",
                "Aux fins du présent règlement, on entend par système d'IA",
                "I",
            ),
            article(
                5,
                "Pratiques interdites",
                "Les pratiques en matière d'IA suivantes sont interdites",
                "II",
            ),
            article(
                50,
                "Obligations de transparence",
                "Les fournisseurs veillent à la transparence",
                "IV",
            ),
        ] {
            store.insert_article(&record).expect("seed article");
        }
        store.rebuild_search_index().expect("search index");
        store
    }

    #[test]
    fn to_fts_query_quotes_each_token() {
        assert_eq!(to_fts_query(r#"système "IA"  risque"#), r#""système" "IA" "risque""#);
        assert_eq!(to_fts_query("   "), "");
    }

    #[test]
    fn search_articles_ranks_matching_articles() {
        let store = seeded_store();
        let hits = search_articles(store.connection(), "interdites", None, 10).expect("search");

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].numero, 5);
        assert_eq!(hits[0].rank, 1);
        assert_eq!(hits[0].chapitre_id.as_deref(), Some("II"));
        assert!(hits[0].snippet.contains("[interdites]"));
    }

    #[test]
    fn search_articles_applies_chapter_filter() {
        let store = seeded_store();

        let all = search_articles(store.connection(), "IA", None, 10).expect("search");
        assert_eq!(all.len(), 2);

        let filtered = search_articles(store.connection(), "IA", Some("I"), 10).expect("search");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].numero, 3);
    }
}
