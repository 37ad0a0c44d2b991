//! Request parameter parsing and response views.
//!
//! # Responsibility
//! - Turn loosely typed string parameters (query string, form body, CLI
//!   flags) into typed feed requests.
//! - Render annotated items into a serializable view.
//!
//! # Invariants
//! - Parsing never touches a backend; every failure is a `ValidationError`.
//! - Keys travel as standard base64 of the 8 raw key bytes.
//! - Without a cursor the listing always starts a descending first page,
//!   whatever `forward` says.

use crate::model::cursor::{Cursor, Direction};
use crate::model::item::{AnnotatedItem, Payload};
use crate::model::key::ItemKey;
use crate::model::validation::ValidationError;
use crate::service::feed_service::{CreateItemRequest, ListRequest, VoteRequest};
use serde::{Deserialize, Serialize};

/// Parameters of a create request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CreateItemParams {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub caption: Option<String>,
}

impl CreateItemParams {
    pub fn parse(&self) -> Result<CreateItemRequest, ValidationError> {
        let mut payload = Payload::new(self.url.trim());
        if let Some(caption) = &self.caption {
            payload = payload.with_caption(caption.as_str());
        }
        payload.validate()?;
        Ok(CreateItemRequest { payload })
    }
}

/// Parameters of a ranked listing.
///
/// The page position is either `cursor` (an opaque token) or the pair
/// `key` + `score` of the last item seen. The token wins when both are given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub score: Option<String>,
    #[serde(default)]
    pub cursor: Option<String>,
    /// `"true"` scans toward higher scores from the cursor.
    #[serde(default)]
    pub forward: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
}

impl ListParams {
    pub fn parse(&self, category: &str) -> Result<ListRequest, ValidationError> {
        let cursor = self.parse_cursor(category)?;
        let direction = match &cursor {
            Some(_) if is_true(self.forward.as_deref()) => Direction::Ascending,
            _ => Direction::Descending,
        };

        let limit = match non_blank(self.limit.as_deref()) {
            Some(text) => Some(
                text.parse::<u32>()
                    .map_err(|_| ValidationError::InvalidLimit(text.to_string()))?,
            ),
            None => None,
        };

        Ok(ListRequest {
            cursor,
            direction,
            limit,
            actor: self.device_id.clone().unwrap_or_default(),
        })
    }

    fn parse_cursor(&self, category: &str) -> Result<Option<Cursor>, ValidationError> {
        if let Some(token) = non_blank(self.cursor.as_deref()) {
            return Cursor::from_token(token).map(Some);
        }

        let Some(key_text) = non_blank(self.key.as_deref()) else {
            return Ok(None);
        };
        let key = ItemKey::from_base64(key_text)?;
        let score_text =
            non_blank(self.score.as_deref()).ok_or(ValidationError::MissingCursorScore)?;
        let score = score_text
            .parse::<u64>()
            .map_err(|_| ValidationError::InvalidScore(score_text.to_string()))?;

        Ok(Some(Cursor::new(category, score, key)))
    }
}

/// Parameters of a vote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VoteParams {
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub key: String,
}

impl VoteParams {
    pub fn parse(&self) -> Result<VoteRequest, ValidationError> {
        if self.device_id.is_empty() {
            return Err(ValidationError::MissingActor);
        }
        let key = ItemKey::from_base64(self.key.trim())?;
        Ok(VoteRequest {
            actor: self.device_id.clone(),
            key,
        })
    }
}

/// Wire view of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemView {
    pub category: String,
    pub key: String,
    pub score: u64,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    pub has_voted: bool,
}

impl ItemView {
    pub fn from_annotated(annotated: &AnnotatedItem) -> Self {
        let item = &annotated.item;
        Self {
            category: item.category.clone(),
            key: item.key.to_base64(),
            score: item.score,
            url: item.payload.url.clone(),
            caption: item.payload.caption.clone(),
            has_voted: annotated.has_voted,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|text| !text.is_empty())
}

fn is_true(value: Option<&str>) -> bool {
    non_blank(value).is_some_and(|text| text.eq_ignore_ascii_case("true"))
}
