//! Caller-fixable input errors.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Malformed input rejected before any backend call is made.
///
/// Every variant is fixable by the caller and must never be retried as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Item payload has no resource locator.
    EmptyUrl,
    /// Item key is not valid standard base64.
    InvalidKeyEncoding(String),
    /// Item key decoded to the wrong number of bytes.
    InvalidKeyLength(usize),
    /// A cursor key was supplied without a score.
    MissingCursorScore,
    /// Cursor score is not a non-negative integer.
    InvalidScore(String),
    /// Page limit is not a non-negative integer.
    InvalidLimit(String),
    /// Opaque cursor token cannot be decoded.
    InvalidCursorToken,
    /// Cursor was issued for another category.
    CursorCategoryMismatch { expected: String, actual: String },
    /// Vote submitted without an actor id.
    MissingActor,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyUrl => write!(f, "url must not be empty"),
            Self::InvalidKeyEncoding(message) => write!(f, "invalid key encoding: {message}"),
            Self::InvalidKeyLength(len) => {
                write!(f, "invalid key length {len}; expected {} bytes", super::key::ITEM_KEY_LEN)
            }
            Self::MissingCursorScore => write!(f, "cursor key requires a score"),
            Self::InvalidScore(value) => write!(f, "invalid score `{value}`"),
            Self::InvalidLimit(value) => write!(f, "invalid limit `{value}`"),
            Self::InvalidCursorToken => write!(f, "invalid cursor token"),
            Self::CursorCategoryMismatch { expected, actual } => write!(
                f,
                "cursor belongs to category `{actual}`, expected `{expected}`"
            ),
            Self::MissingActor => write!(f, "device_id must not be empty"),
        }
    }
}

impl Error for ValidationError {}
