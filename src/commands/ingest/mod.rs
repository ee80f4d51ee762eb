mod engine;
mod fetch;
mod normalize;
mod numbering;
mod run;
mod store;
mod structure;

pub use run::{RunStatus, run};

pub(crate) use engine::IngestError;
pub(crate) use fetch::FetchError;
pub(crate) use store::{count_rows, open_read_only, read_metadata};
#[cfg(test)]
pub(crate) use store::{ArticleStore, CorpusRow, SqliteArticleStore};
