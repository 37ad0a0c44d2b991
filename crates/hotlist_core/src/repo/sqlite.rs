//! SQLite-backed feed storage.
//!
//! # Responsibility
//! - Map the backend primitives onto the `items` / `votes` schema.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Conditional puts rely on primary-key conflicts (`ON CONFLICT DO NOTHING`)
//!   and report them through the changed-row count.
//! - Score adds are single `UPDATE ... RETURNING` statements.
//! - Read paths reject rows that cannot be decoded instead of masking them.

use super::{BackendError, BackendResult, FeedBackend, PutOutcome, ScoreQuery};
use crate::db::{open_db, open_db_in_memory};
use crate::model::cursor::Direction;
use crate::model::item::{Item, Payload};
use crate::model::key::ItemKey;
use crate::model::vote::{ItemRef, Vote};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;

const ITEM_COLUMNS: &str = "category, item_key, score, url, caption";

/// Feed backend over one SQLite connection.
///
/// Calls are serialized through a mutex; SQLite itself provides the
/// atomicity of each statement.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Wraps a connection that already has feed migrations applied.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> BackendResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn open_in_memory() -> BackendResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    fn with_conn<T>(&self, op: impl FnOnce(&Connection) -> BackendResult<T>) -> BackendResult<T> {
        let conn = self.conn.lock();
        op(&conn)
    }
}

#[async_trait]
impl FeedBackend for SqliteBackend {
    async fn put_item_if_absent(&self, item: &Item) -> BackendResult<PutOutcome> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT INTO items (category, item_key, score, url, caption)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (category, item_key) DO NOTHING;",
                params![
                    item.category.as_str(),
                    item.key.as_bytes(),
                    score_to_db(item.score)?,
                    item.payload.url.as_str(),
                    item.payload.caption.as_deref(),
                ],
            )?;
            Ok(put_outcome(changed))
        })
    }

    async fn get_item(&self, category: &str, key: &ItemKey) -> BackendResult<Option<Item>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ITEM_COLUMNS} FROM items WHERE category = ?1 AND item_key = ?2;"
            ))?;
            let mut rows = stmt.query(params![category, key.as_bytes()])?;
            if let Some(row) = rows.next()? {
                return Ok(Some(parse_item_row(row)?));
            }
            Ok(None)
        })
    }

    async fn add_to_score(
        &self,
        category: &str,
        key: &ItemKey,
        delta: u64,
    ) -> BackendResult<Item> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "UPDATE items SET score = score + ?3
                 WHERE category = ?1 AND item_key = ?2
                 RETURNING {ITEM_COLUMNS};"
            ))?;
            let mut rows = stmt
                .query(params![category, key.as_bytes(), score_to_db(delta)?])
                .map_err(lock_conflict_as_rejected)?;
            if let Some(row) = rows.next().map_err(lock_conflict_as_rejected)? {
                return parse_item_row(row);
            }
            Err(BackendError::NotFound {
                category: category.to_string(),
                key: *key,
            })
        })
    }

    async fn set_score(&self, category: &str, key: &ItemKey, score: u64) -> BackendResult<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE items SET score = ?3 WHERE category = ?1 AND item_key = ?2;",
                params![category, key.as_bytes(), score_to_db(score)?],
            )?;
            if changed == 0 {
                return Err(BackendError::NotFound {
                    category: category.to_string(),
                    key: *key,
                });
            }
            Ok(())
        })
    }

    async fn query_by_score(&self, query: &ScoreQuery) -> BackendResult<Vec<Item>> {
        if query.limit == 0 {
            return Ok(Vec::new());
        }

        self.with_conn(|conn| {
            let (comparison, order) = match query.direction {
                Direction::Descending => ("<", "DESC"),
                Direction::Ascending => (">", "ASC"),
            };

            let mut sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE category = ?");
            let mut bind_values: Vec<Value> = vec![Value::Text(query.category.clone())];

            if let Some(cursor) = &query.start_after {
                sql.push_str(&format!(
                    " AND (score {comparison} ? OR (score = ? AND item_key {comparison} ?))"
                ));
                let score = score_to_db(cursor.score)?;
                bind_values.push(Value::Integer(score));
                bind_values.push(Value::Integer(score));
                bind_values.push(Value::Blob(cursor.key.as_bytes().to_vec()));
            }

            sql.push_str(&format!(" ORDER BY score {order}, item_key {order} LIMIT ?"));
            bind_values.push(Value::Integer(i64::from(query.limit)));

            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(bind_values))?;
            let mut items = Vec::new();
            while let Some(row) = rows.next()? {
                items.push(parse_item_row(row)?);
            }
            Ok(items)
        })
    }

    async fn put_vote_if_absent(&self, vote: &Vote) -> BackendResult<PutOutcome> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT INTO votes (actor, item_ref) VALUES (?1, ?2)
                 ON CONFLICT (actor, item_ref) DO NOTHING;",
                params![vote.actor.as_bytes(), vote.item_ref.as_bytes()],
            )?;
            Ok(put_outcome(changed))
        })
    }

    async fn vote_exists(&self, actor: &str, item_ref: &ItemRef) -> BackendResult<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM votes WHERE actor = ?1 AND item_ref = ?2;",
                    params![actor.as_bytes(), item_ref.as_bytes()],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    async fn count_votes(&self, item_ref: &ItemRef) -> BackendResult<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM votes WHERE item_ref = ?1;",
                [item_ref.as_bytes()],
                |row| row.get(0),
            )?;
            score_from_db(count)
        })
    }
}

fn put_outcome(changed: usize) -> PutOutcome {
    if changed == 0 {
        PutOutcome::Conflict
    } else {
        PutOutcome::Created
    }
}

/// A busy or locked database refuses the statement before it writes.
fn lock_conflict_as_rejected(err: rusqlite::Error) -> BackendError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            BackendError::Rejected(err.to_string())
        }
        _ => err.into(),
    }
}

fn parse_item_row(row: &Row<'_>) -> BackendResult<Item> {
    let key_bytes: Vec<u8> = row.get("item_key")?;
    let key = ItemKey::from_slice(&key_bytes).map_err(|_| {
        BackendError::InvalidData(format!(
            "invalid key length {} in items.item_key",
            key_bytes.len()
        ))
    })?;

    let mut payload = Payload::new(row.get::<_, String>("url")?);
    payload.caption = row.get("caption")?;

    Ok(Item {
        category: row.get("category")?,
        key,
        score: score_from_db(row.get("score")?)?,
        payload,
    })
}

fn score_to_db(value: u64) -> BackendResult<i64> {
    i64::try_from(value)
        .map_err(|_| BackendError::InvalidData(format!("score {value} exceeds SQLite range")))
}

fn score_from_db(value: i64) -> BackendResult<u64> {
    u64::try_from(value)
        .map_err(|_| BackendError::InvalidData(format!("negative score {value} in items.score")))
}
