use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::info;
use ureq::Agent;

use crate::model::SourceDocument;
use crate::util::{ensure_directory, sha256_bytes};

const MAX_DOCUMENT_BYTES: u64 = 64 * 1024 * 1024;
const FETCH_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub(crate) enum FetchError {
    #[error("failed to fetch {url}")]
    Transport {
        url: String,
        #[source]
        source: ureq::Error,
    },
    #[error("failed to read response body from {url}")]
    Body {
        url: String,
        #[source]
        source: ureq::Error,
    },
    #[error("failed to read source document {}", path.display())]
    LocalFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// HTTP client for one run. Built once and handed to every fetch.
pub(crate) fn build_agent() -> Agent {
    Agent::config_builder()
        .timeout_global(Some(FETCH_TIMEOUT))
        .build()
        .into()
}

/// Single blocking GET; non-2xx statuses surface as transport errors.
pub(crate) fn fetch_document(agent: &Agent, url: &str) -> Result<String, FetchError> {
    let mut response = agent.get(url).call().map_err(|source| FetchError::Transport {
        url: url.to_string(),
        source,
    })?;

    response
        .body_mut()
        .with_config()
        .limit(MAX_DOCUMENT_BYTES)
        .read_to_string()
        .map_err(|source| FetchError::Body {
            url: url.to_string(),
            source,
        })
}

pub(crate) fn read_local_document(path: &Path) -> Result<String, FetchError> {
    fs::read_to_string(path).map_err(|source| FetchError::LocalFile {
        path: path.to_path_buf(),
        source,
    })
}

/// Copies the raw document under `<cache_root>/sources/` keyed by its digest.
pub(crate) fn cache_source_document(
    cache_root: &Path,
    origin: &str,
    html: &str,
) -> Result<SourceDocument> {
    let sources_dir = cache_root.join("sources");
    ensure_directory(&sources_dir)?;

    let sha256 = sha256_bytes(html.as_bytes());
    let cached_path = sources_dir.join(format!("{}.html", &sha256[..16]));
    if !cached_path.exists() {
        fs::write(&cached_path, html).with_context(|| {
            format!("failed to cache source document: {}", cached_path.display())
        })?;
    }

    info!(
        origin = %origin,
        path = %cached_path.display(),
        bytes = html.len(),
        "cached source document"
    );

    Ok(SourceDocument {
        origin: origin.to_string(),
        cached_path: cached_path.display().to_string(),
        sha256,
        byte_count: html.len(),
    })
}
