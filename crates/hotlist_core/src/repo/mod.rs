//! Storage backend contract and implementations.
//!
//! # Responsibility
//! - Define the primitives the feed core needs from a key-value store:
//!   conditional puts, atomic score adds and ranked range scans.
//! - Keep backend-specific encodings (SQL, DynamoDB attributes) out of the
//!   service layer.
//!
//! # Invariants
//! - Conditional-put conflicts are reported as `PutOutcome::Conflict`, never
//!   as `BackendError`.
//! - Score updates on a missing item fail with `BackendError::NotFound` and
//!   never create a row.
//! - `query_by_score` returns items in the `(score, key)` total order for the
//!   requested direction, strictly past the start cursor.

use crate::config::{BackendConfig, EngineConfig};
use crate::db::DbError;
use crate::model::cursor::{Cursor, Direction};
use crate::model::item::Item;
use crate::model::key::ItemKey;
use crate::model::vote::{ItemRef, Vote};
use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[cfg(feature = "dynamodb")]
pub mod dynamodb;
pub mod memory;
pub mod sqlite;

pub type BackendResult<T> = Result<T, BackendError>;

/// Storage fault. Anything here is a server-side problem.
#[derive(Debug)]
pub enum BackendError {
    Db(DbError),
    /// Targeted item does not exist.
    NotFound { category: String, key: ItemKey },
    /// Stored data cannot be decoded into the feed model.
    InvalidData(String),
    /// Request failed and may or may not have been applied.
    Service(String),
    /// Request was refused before anything was written; safe to resend.
    Rejected(String),
    /// Backend kind is not compiled into this binary.
    Unsupported(&'static str),
}

impl Display for BackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { category, key } => write!(f, "item not found: {category}/{key}"),
            Self::InvalidData(message) => write!(f, "invalid stored feed data: {message}"),
            Self::Service(message) => write!(f, "backend request failed: {message}"),
            Self::Rejected(message) => write!(f, "backend request rejected: {message}"),
            Self::Unsupported(kind) => write!(f, "backend `{kind}` is not enabled in this build"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl BackendError {
    /// Whether the failed write is known to have left storage untouched.
    pub fn is_unapplied(&self) -> bool {
        matches!(self, Self::Rejected(_) | Self::NotFound { .. })
    }
}

impl From<DbError> for BackendError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for BackendError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Result of a conditional (compare-and-absent) put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    Conflict,
}

/// Range scan over the `(category, score)` index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreQuery {
    pub category: String,
    /// Exclusive start position; `None` starts at the scan's first item.
    pub start_after: Option<Cursor>,
    pub direction: Direction,
    pub limit: u32,
}

impl ScoreQuery {
    pub fn first_page(category: impl Into<String>, limit: u32) -> Self {
        Self {
            category: category.into(),
            start_after: None,
            direction: Direction::Descending,
            limit,
        }
    }
}

/// Storage primitives required by the feed core.
#[async_trait]
pub trait FeedBackend: Send + Sync {
    /// Stores `item` unless `(category, key)` already exists.
    async fn put_item_if_absent(&self, item: &Item) -> BackendResult<PutOutcome>;

    async fn get_item(&self, category: &str, key: &ItemKey) -> BackendResult<Option<Item>>;

    /// Atomically adds `delta` to an existing item's score.
    ///
    /// Failures that provably wrote nothing are `Rejected`; any other error
    /// may hide an applied add, so callers must not blindly resend it.
    async fn add_to_score(&self, category: &str, key: &ItemKey, delta: u64)
        -> BackendResult<Item>;

    /// Overwrites an existing item's score. Used by reconciliation only.
    async fn set_score(&self, category: &str, key: &ItemKey, score: u64) -> BackendResult<()>;

    async fn query_by_score(&self, query: &ScoreQuery) -> BackendResult<Vec<Item>>;

    /// Stores `vote` unless `(actor, item_ref)` already exists.
    async fn put_vote_if_absent(&self, vote: &Vote) -> BackendResult<PutOutcome>;

    async fn vote_exists(&self, actor: &str, item_ref: &ItemRef) -> BackendResult<bool>;

    async fn count_votes(&self, item_ref: &ItemRef) -> BackendResult<u64>;
}

/// Builds the backend selected by `config.backend`.
pub async fn open_backend(config: &EngineConfig) -> BackendResult<Arc<dyn FeedBackend>> {
    match &config.backend {
        BackendConfig::Memory => Ok(Arc::new(memory::MemoryBackend::new())),
        BackendConfig::Sqlite { path } => Ok(Arc::new(sqlite::SqliteBackend::open(path)?)),
        #[cfg(feature = "dynamodb")]
        BackendConfig::DynamoDb(settings) => Ok(Arc::new(
            dynamodb::DynamoDbBackend::connect(settings, dynamodb::DynamoDbTables::from(config))
                .await?,
        )),
        #[cfg(not(feature = "dynamodb"))]
        BackendConfig::DynamoDb(_) => Err(BackendError::Unsupported("dynamodb")),
    }
}
