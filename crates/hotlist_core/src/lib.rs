//! Core of the hotlist ranked feed.
//!
//! Items are ranked by vote count; each actor may vote on an item once.
//! Storage is pluggable through `repo::FeedBackend`.

pub mod api;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use api::{CreateItemParams, ItemView, ListParams, VoteParams};
pub use config::{BackendConfig, ConfigError, DynamoDbSettings, EngineConfig};
pub use logging::{default_log_level, init_logging, LoggingError};
pub use model::cursor::{Cursor, Direction};
pub use model::item::{AnnotatedItem, Item, Payload};
pub use model::key::{ItemKey, KeyGenerator};
pub use model::validation::ValidationError;
pub use model::vote::{ItemRef, Vote};
pub use repo::{open_backend, BackendError, BackendResult, FeedBackend, PutOutcome, ScoreQuery};
pub use service::feed_service::{
    AnnotatedPage, CreateItemRequest, FeedService, ListRequest, VoteRequest, VoteResult,
};
pub use service::reconcile::{ReconcileReport, Reconciler};
pub use service::{ErrorClass, FeedError, FeedResult};

