use std::path::PathBuf;
use thiserror::Error;

/// Network or HTTP failure for one commodity/date request.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
}

/// Markup that could not be turned into tables.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid selector {selector:?}: {reason}")]
    Selector { selector: &'static str, reason: String },
}

/// Why one commodity contributed nothing for a date. Never fatal.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Persistence failure. Always fatal to a sync run.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] duckdb::Error),

    #[error("could not prepare database directory {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Startup problems; the sync engine never runs when one of these occurs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("commodity reference list not found at {0:?}")]
    MissingReference(PathBuf),

    #[error("commodity reference list {path:?} is unreadable: {source}")]
    Reference {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("commodity reference list {0:?} has no entries")]
    EmptyReference(PathBuf),

    #[error("no storage target configured (storage.db_path is empty)")]
    MissingDatabase,

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error(transparent)]
    Source(#[from] config::ConfigError),
}

/// Run-level error surfaced by the sync engine.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
