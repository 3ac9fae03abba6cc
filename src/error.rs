//! Error taxonomy for the selection engine.
//!
//! Mirrors the kinds (not exception names) called out in the design: most
//! variants are things callers need to match on and react to differently
//! (`NotFound` vs `AuthError` in particular — see `remote`), not just
//! human-readable strings.

use std::path::PathBuf;

/// Errors produced by the selection engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A source file could not be stat'd or read.
    #[error("file unreadable: {path}")]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The store file exists but could not be opened (corrupt WAL, bad
    /// header, etc). Callers at the top of the stack delete and recreate.
    #[error("store corrupted at {path}")]
    StoreCorruption {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Transient contention with another writer.
    #[error("store busy")]
    StoreBusy(#[source] rusqlite::Error),

    /// A remote key does not exist. Selection-path callers treat this as
    /// "no remote baseline" and continue; it is not a fatal condition.
    #[error("not found: {key}")]
    NotFound { key: String },

    /// The remote rejected credentials. Unlike `NotFound`, this must not be
    /// silently swallowed — the host is expected to abort the run.
    #[error("authentication failed: {message}")]
    AuthError { message: String },

    /// An unrecognized remote URL scheme (only `file://` and `s3://` are
    /// supported).
    #[error("unknown remote URL scheme: {0}")]
    UnknownUrlScheme(String),

    /// A CLI or config argument was invalid (bad input, empty input set).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The configuration file was present but malformed.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Non-fatal conditions the engine surfaces alongside a successful result.
///
/// `CommitMismatch` and `ScopeMismatch` are explicitly *not* errors — they
/// travel as data, not as `Err`, so a caller can decide whether to log
/// them, force a full run, or ignore them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// Baselines being merged were captured at different commits.
    CommitMismatch { details: String },
    /// The current run's scope is not a subset of the baseline's scope.
    ScopeMismatch {
        current: Vec<String>,
        baseline: Vec<String>,
    },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::CommitMismatch { details } => {
                write!(f, "merging baselines from different commits: {details}")
            }
            Warning::ScopeMismatch { current, baseline } => {
                write!(
                    f,
                    "current scope {current:?} is not a subset of baseline scope {baseline:?}"
                )
            }
        }
    }
}
