use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

pub const DEFAULT_SOURCE_URL: &str =
    "https://eur-lex.europa.eu/legal-content/FR/TXT/HTML/?uri=OJ:L_202401689";

#[derive(Parser, Debug)]
#[command(
    name = "ria",
    version,
    about = "Article corpus extraction and lookup for the EU AI Act (RIA)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Ingest(IngestArgs),
    Status(StatusArgs),
    Query(QueryArgs),
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    #[arg(long, default_value = ".cache/ria")]
    pub cache_root: PathBuf,

    #[arg(long, default_value = DEFAULT_SOURCE_URL)]
    pub source_url: String,

    /// Read the document from disk instead of fetching `--source-url`.
    #[arg(long)]
    pub html_path: Option<PathBuf>,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub ingest_manifest_path: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = DuplicatePolicy::Append)]
    pub duplicate_policy: DuplicatePolicy,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    #[arg(long, default_value_t = false)]
    pub skip_chapters: bool,

    #[arg(long, default_value_t = false)]
    pub skip_recitals: bool,

    #[arg(long, default_value_t = false)]
    pub skip_annexes: bool,
}

/// What happens when a row with the same key is already present in the store.
/// Articles and recitals are keyed by number, chapters and annexes by label.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum DuplicatePolicy {
    /// Insert a new row every time; re-running yields duplicate rows.
    Append,
    /// Delete rows carrying the same key before inserting.
    ReplaceByNumber,
}

impl DuplicatePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::ReplaceByNumber => "replace-by-number",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/ria")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    #[arg(long, default_value = ".cache/ria")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub query: String,

    #[arg(long, default_value_t = 10)]
    pub limit: usize,

    #[arg(long)]
    pub chapter: Option<String>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}
