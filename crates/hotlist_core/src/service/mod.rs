//! Feed use-case services.
//!
//! # Responsibility
//! - Implement item creation, vote recording, ranked queries and vote
//!   annotation on top of a `FeedBackend`.
//! - Translate backend outcomes into the feed error taxonomy.
//!
//! # Invariants
//! - Services hold no state beyond configuration and the backend handle.
//! - `AlreadyVoted` is an outcome, never an error.

use crate::model::key::ItemKey;
use crate::model::validation::ValidationError;
use crate::model::vote::ItemRef;
use crate::repo::BackendError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod feed_service;
pub mod item_store;
pub mod ranked_query;
pub mod reconcile;
pub mod vote_annotator;
pub mod vote_ledger;

pub type FeedResult<T> = Result<T, FeedError>;

/// Who has to act on an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller-fixable; report as a rejected request.
    Client,
    /// Server fault; log the detail, answer with an opaque message.
    Server,
}

const OPAQUE_SERVER_MESSAGE: &str = "internal server error";

#[derive(Debug)]
pub enum FeedError {
    Validation(ValidationError),
    /// Vote targets an item that does not exist.
    UnknownItem { category: String, key: ItemKey },
    /// Item key collision on create. Signals broken key uniqueness.
    DuplicateKey { category: String, key: ItemKey },
    Backend(BackendError),
    /// The vote is recorded but its score increment was not confirmed.
    ///
    /// Unless `source.is_unapplied()`, the increment may still have landed;
    /// `Reconciler` restores the exact count either way.
    ScoreNotApplied {
        item_ref: ItemRef,
        attempts: u32,
        source: BackendError,
    },
}

impl FeedError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation(_) | Self::UnknownItem { .. } => ErrorClass::Client,
            Self::DuplicateKey { .. } | Self::Backend(_) | Self::ScoreNotApplied { .. } => {
                ErrorClass::Server
            }
        }
    }

    /// Message safe to hand back to an external caller.
    pub fn public_message(&self) -> String {
        match self.class() {
            ErrorClass::Client => self.to_string(),
            ErrorClass::Server => OPAQUE_SERVER_MESSAGE.to_string(),
        }
    }
}

impl Display for FeedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::UnknownItem { category, key } => write!(f, "unknown item {category}/{key}"),
            Self::DuplicateKey { category, key } => {
                write!(f, "item key already exists: {category}/{key}")
            }
            Self::Backend(err) => write!(f, "{err}"),
            Self::ScoreNotApplied {
                attempts, source, ..
            } => write!(
                f,
                "vote recorded but score increment was not confirmed after {attempts} attempt(s): {source}"
            ),
        }
    }
}

impl Error for FeedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Backend(err) => Some(err),
            Self::ScoreNotApplied { source, .. } => Some(source),
            Self::UnknownItem { .. } | Self::DuplicateKey { .. } => None,
        }
    }
}

impl From<ValidationError> for FeedError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<BackendError> for FeedError {
    fn from(value: BackendError) -> Self {
        Self::Backend(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorClass, FeedError};
    use crate::model::validation::ValidationError;
    use crate::repo::BackendError;

    #[test]
    fn server_faults_hide_backend_detail() {
        let err = FeedError::from(BackendError::Service("secret endpoint exploded".to_string()));
        assert_eq!(err.class(), ErrorClass::Server);
        assert_eq!(err.public_message(), "internal server error");
        assert!(err.to_string().contains("secret endpoint"));
    }

    #[test]
    fn validation_errors_are_reported_verbatim() {
        let err = FeedError::from(ValidationError::InvalidLimit("ten".to_string()));
        assert_eq!(err.class(), ErrorClass::Client);
        assert_eq!(err.public_message(), "invalid limit `ten`");
    }
}
