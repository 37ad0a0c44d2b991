//! DynamoDB feed backend.
//!
//! ## Table layout
//!
//! ```text
//! items table (configurable name)
//!   I  (S, partition key)  category
//!   K  (B, sort key)       item key
//!   S  (N)                 score
//!   R  (B)                 rank = score (8 bytes BE) || key
//!   URL (S), C (S, optional caption)
//!   GSI `score_index`: partition I, sort R
//!
//! votes table (configurable name)
//!   D  (B, partition key)  actor
//!   P  (B, sort key)       item ref
//! ```
//!
//! Sorting the GSI on `R` instead of `S` makes the index order the full
//! `(score, key)` order, so equal scores page deterministically. Provisioning
//! the tables is done outside this crate.

use super::{BackendError, BackendResult, FeedBackend, PutOutcome, ScoreQuery};
use crate::config::{DynamoDbSettings, EngineConfig};
use crate::model::cursor::Direction;
use crate::model::item::{Item, Payload};
use crate::model::key::ItemKey;
use crate::model::vote::{ItemRef, Vote};
use async_trait::async_trait;
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;
use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue, Select};
use aws_sdk_dynamodb::Client;
use aws_smithy_types::timeout::TimeoutConfig;
use log::debug;
use std::collections::HashMap;
use std::time::Duration;

pub const ATTR_CATEGORY: &str = "I";
pub const ATTR_KEY: &str = "K";
pub const ATTR_SCORE: &str = "S";
pub const ATTR_RANK: &str = "R";
pub const ATTR_URL: &str = "URL";
pub const ATTR_CAPTION: &str = "C";
pub const ATTR_ACTOR: &str = "D";
pub const ATTR_ITEM_REF: &str = "P";

/// Compare-and-set rounds for one score update under contention.
const MAX_SCORE_CAS_ROUNDS: u32 = 8;

type AttributeMap = HashMap<String, AttributeValue>;

/// Table and index names resolved from `EngineConfig`.
#[derive(Debug, Clone)]
pub struct DynamoDbTables {
    pub items: String,
    pub votes: String,
    pub score_index: String,
}

impl From<&EngineConfig> for DynamoDbTables {
    fn from(config: &EngineConfig) -> Self {
        Self {
            items: config.item_table.clone(),
            votes: config.vote_table.clone(),
            score_index: config.score_index.clone(),
        }
    }
}

#[derive(Clone)]
pub struct DynamoDbBackend {
    client: Client,
    tables: DynamoDbTables,
}

impl std::fmt::Debug for DynamoDbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbBackend")
            .field("tables", &self.tables)
            .finish()
    }
}

impl DynamoDbBackend {
    /// Builds a client from the SDK default chain plus `settings` overrides.
    pub async fn connect(
        settings: &DynamoDbSettings,
        tables: DynamoDbTables,
    ) -> BackendResult<Self> {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let mut builder = aws_sdk_dynamodb::config::Builder::from(&sdk_config);

        if let Some(region) = &settings.region {
            builder = builder.region(aws_sdk_dynamodb::config::Region::new(region.clone()));
        }
        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        if let Some(timeout_ms) = settings.timeout_ms {
            builder = builder.timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(Duration::from_millis(timeout_ms))
                    .build(),
            );
        }

        Ok(Self::from_client(Client::from_conf(builder.build()), tables))
    }

    /// Wraps a pre-built client.
    pub fn from_client(client: Client, tables: DynamoDbTables) -> Self {
        Self { client, tables }
    }

    async fn read_item(&self, category: &str, key: &ItemKey) -> BackendResult<Option<Item>> {
        let response = self
            .client
            .get_item()
            .table_name(&self.tables.items)
            .key(ATTR_CATEGORY, AttributeValue::S(category.to_string()))
            .key(ATTR_KEY, blob(key.as_bytes()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| service_error("GetItem", e))?;

        response.item().map(item_from_attributes).transpose()
    }
}

fn blob(bytes: &[u8]) -> AttributeValue {
    AttributeValue::B(Blob::new(bytes.to_vec()))
}

fn number(value: u64) -> AttributeValue {
    AttributeValue::N(value.to_string())
}

fn rank(score: u64, key: &ItemKey) -> AttributeValue {
    let mut bytes = Vec::with_capacity(16);
    bytes.extend_from_slice(&score.to_be_bytes());
    bytes.extend_from_slice(key.as_bytes());
    AttributeValue::B(Blob::new(bytes))
}

fn service_error(operation: &str, err: impl std::fmt::Display) -> BackendError {
    BackendError::Service(format!("DynamoDB {operation} failed: {err}"))
}

fn is_put_conditional_check_failed(err: &SdkError<PutItemError>) -> bool {
    matches!(
        err,
        SdkError::ServiceError(service_err)
            if matches!(service_err.err(), PutItemError::ConditionalCheckFailedException(_))
    )
}

fn is_update_conditional_check_failed(err: &SdkError<UpdateItemError>) -> bool {
    matches!(
        err,
        SdkError::ServiceError(service_err)
            if matches!(service_err.err(), UpdateItemError::ConditionalCheckFailedException(_))
    )
}

/// Errors raised before DynamoDB applied the update: throttling or a request
/// that was never built.
fn is_update_refused(err: &SdkError<UpdateItemError>) -> bool {
    match err {
        SdkError::ConstructionFailure(_) => true,
        SdkError::ServiceError(service_err) => matches!(
            service_err.err(),
            UpdateItemError::ProvisionedThroughputExceededException(_)
                | UpdateItemError::RequestLimitExceeded(_)
        ),
        _ => false,
    }
}

fn item_from_attributes(attributes: &AttributeMap) -> BackendResult<Item> {
    let string = |name: &str| -> Option<String> {
        attributes.get(name).and_then(|v| v.as_s().ok()).cloned()
    };

    let category = string(ATTR_CATEGORY)
        .ok_or_else(|| BackendError::InvalidData("item without category".to_string()))?;
    let key_blob = attributes
        .get(ATTR_KEY)
        .and_then(|v| v.as_b().ok())
        .ok_or_else(|| BackendError::InvalidData("item without key".to_string()))?;
    let key = ItemKey::from_slice(key_blob.as_ref())
        .map_err(|err| BackendError::InvalidData(format!("item key: {err}")))?;
    let score = attributes
        .get(ATTR_SCORE)
        .and_then(|v| v.as_n().ok())
        .map(|n| n.parse::<u64>())
        .transpose()
        .map_err(|err| BackendError::InvalidData(format!("item score: {err}")))?
        .unwrap_or(0);
    let url = string(ATTR_URL)
        .ok_or_else(|| BackendError::InvalidData(format!("item {category}/{key} without url")))?;

    let mut payload = Payload::new(url);
    payload.caption = string(ATTR_CAPTION);

    Ok(Item {
        category,
        key,
        score,
        payload,
    })
}

#[async_trait]
impl FeedBackend for DynamoDbBackend {
    async fn put_item_if_absent(&self, item: &Item) -> BackendResult<PutOutcome> {
        let mut request = self
            .client
            .put_item()
            .table_name(&self.tables.items)
            .item(ATTR_CATEGORY, AttributeValue::S(item.category.clone()))
            .item(ATTR_KEY, blob(item.key.as_bytes()))
            .item(ATTR_SCORE, number(item.score))
            .item(ATTR_RANK, rank(item.score, &item.key))
            .item(ATTR_URL, AttributeValue::S(item.payload.url.clone()))
            .condition_expression("attribute_not_exists(#k)")
            .expression_attribute_names("#k", ATTR_KEY);
        if let Some(caption) = &item.payload.caption {
            request = request.item(ATTR_CAPTION, AttributeValue::S(caption.clone()));
        }

        match request.send().await {
            Ok(_) => Ok(PutOutcome::Created),
            Err(e) if is_put_conditional_check_failed(&e) => Ok(PutOutcome::Conflict),
            Err(e) => Err(service_error("PutItem", e)),
        }
    }

    async fn get_item(&self, category: &str, key: &ItemKey) -> BackendResult<Option<Item>> {
        self.read_item(category, key).await
    }

    async fn add_to_score(
        &self,
        category: &str,
        key: &ItemKey,
        delta: u64,
    ) -> BackendResult<Item> {
        // `R` must move with `S`, and an update expression cannot rebuild a
        // binary attribute from a numeric add, so this is a CAS loop on `S`.
        for round in 1..=MAX_SCORE_CAS_ROUNDS {
            // Every earlier round lost its condition check, so nothing has
            // been written yet when this read fails.
            let current = self
                .read_item(category, key)
                .await
                .map_err(|err| BackendError::Rejected(err.to_string()))?
                .ok_or_else(|| BackendError::NotFound {
                    category: category.to_string(),
                    key: *key,
                })?;
            let next = current.score.checked_add(delta).ok_or_else(|| {
                BackendError::InvalidData(format!("score overflow on {category}/{key}"))
            })?;

            let result = self
                .client
                .update_item()
                .table_name(&self.tables.items)
                .key(ATTR_CATEGORY, AttributeValue::S(category.to_string()))
                .key(ATTR_KEY, blob(key.as_bytes()))
                .update_expression("SET #s = :next, #r = :rank")
                .condition_expression("#s = :current")
                .expression_attribute_names("#s", ATTR_SCORE)
                .expression_attribute_names("#r", ATTR_RANK)
                .expression_attribute_values(":next", number(next))
                .expression_attribute_values(":current", number(current.score))
                .expression_attribute_values(":rank", rank(next, key))
                .return_values(ReturnValue::AllNew)
                .send()
                .await;

            match result {
                Ok(output) => {
                    return match output.attributes() {
                        Some(attributes) => item_from_attributes(attributes),
                        None => Ok(Item {
                            score: next,
                            ..current
                        }),
                    };
                }
                Err(e) if is_update_conditional_check_failed(&e) => {
                    debug!(
                        "event=score_cas module=dynamodb status=retry round={round} max_rounds={MAX_SCORE_CAS_ROUNDS}"
                    );
                }
                Err(e) if is_update_refused(&e) => {
                    return Err(BackendError::Rejected(format!("DynamoDB UpdateItem: {e}")))
                }
                Err(e) => return Err(service_error("UpdateItem", e)),
            }
        }

        Err(BackendError::Rejected(format!(
            "score update on {category}/{key} lost {MAX_SCORE_CAS_ROUNDS} compare-and-set rounds"
        )))
    }

    async fn set_score(&self, category: &str, key: &ItemKey, score: u64) -> BackendResult<()> {
        let result = self
            .client
            .update_item()
            .table_name(&self.tables.items)
            .key(ATTR_CATEGORY, AttributeValue::S(category.to_string()))
            .key(ATTR_KEY, blob(key.as_bytes()))
            .update_expression("SET #s = :score, #r = :rank")
            .condition_expression("attribute_exists(#k)")
            .expression_attribute_names("#s", ATTR_SCORE)
            .expression_attribute_names("#r", ATTR_RANK)
            .expression_attribute_names("#k", ATTR_KEY)
            .expression_attribute_values(":score", number(score))
            .expression_attribute_values(":rank", rank(score, key))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_update_conditional_check_failed(&e) => Err(BackendError::NotFound {
                category: category.to_string(),
                key: *key,
            }),
            Err(e) => Err(service_error("UpdateItem", e)),
        }
    }

    async fn query_by_score(&self, query: &ScoreQuery) -> BackendResult<Vec<Item>> {
        if query.limit == 0 {
            return Ok(Vec::new());
        }
        let limit = i32::try_from(query.limit).unwrap_or(i32::MAX);

        let mut request = self
            .client
            .query()
            .table_name(&self.tables.items)
            .index_name(&self.tables.score_index)
            .key_condition_expression("#i = :i")
            .expression_attribute_names("#i", ATTR_CATEGORY)
            .expression_attribute_values(":i", AttributeValue::S(query.category.clone()))
            .scan_index_forward(query.direction == Direction::Ascending)
            .limit(limit);

        if let Some(cursor) = &query.start_after {
            let start_key: AttributeMap = HashMap::from([
                (
                    ATTR_CATEGORY.to_string(),
                    AttributeValue::S(query.category.clone()),
                ),
                (ATTR_KEY.to_string(), blob(cursor.key.as_bytes())),
                (ATTR_RANK.to_string(), rank(cursor.score, &cursor.key)),
            ]);
            request = request.set_exclusive_start_key(Some(start_key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| service_error("Query", e))?;

        response.items().iter().map(item_from_attributes).collect()
    }

    async fn put_vote_if_absent(&self, vote: &Vote) -> BackendResult<PutOutcome> {
        let result = self
            .client
            .put_item()
            .table_name(&self.tables.votes)
            .item(ATTR_ACTOR, blob(vote.actor.as_bytes()))
            .item(ATTR_ITEM_REF, blob(vote.item_ref.as_bytes()))
            .condition_expression("attribute_not_exists(#d)")
            .expression_attribute_names("#d", ATTR_ACTOR)
            .send()
            .await;

        match result {
            Ok(_) => Ok(PutOutcome::Created),
            Err(e) if is_put_conditional_check_failed(&e) => Ok(PutOutcome::Conflict),
            Err(e) => Err(service_error("PutItem", e)),
        }
    }

    async fn vote_exists(&self, actor: &str, item_ref: &ItemRef) -> BackendResult<bool> {
        let response = self
            .client
            .get_item()
            .table_name(&self.tables.votes)
            .key(ATTR_ACTOR, blob(actor.as_bytes()))
            .key(ATTR_ITEM_REF, blob(item_ref.as_bytes()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| service_error("GetItem", e))?;

        Ok(response.item().is_some())
    }

    async fn count_votes(&self, item_ref: &ItemRef) -> BackendResult<u64> {
        let mut total = 0u64;
        let mut last_evaluated_key = None;

        loop {
            let mut request = self
                .client
                .scan()
                .table_name(&self.tables.votes)
                .filter_expression("#p = :p")
                .expression_attribute_names("#p", ATTR_ITEM_REF)
                .expression_attribute_values(":p", blob(item_ref.as_bytes()))
                .select(Select::Count);
            if let Some(key) = last_evaluated_key.take() {
                request = request.set_exclusive_start_key(Some(key));
            }

            let response = request
                .send()
                .await
                .map_err(|e| service_error("Scan", e))?;
            total += u64::try_from(response.count()).unwrap_or(0);

            match response.last_evaluated_key() {
                Some(key) if !key.is_empty() => last_evaluated_key = Some(key.clone()),
                _ => break,
            }
        }

        Ok(total)
    }
}
