//! Feed domain model.
//!
//! # Responsibility
//! - Define the canonical item, vote and cursor shapes used by core logic.
//! - Own the byte encodings that storage ordering depends on.
//!
//! # Invariants
//! - `(category, key)` identifies exactly one item.
//! - `(actor, item_ref)` identifies at most one vote.
//! - Only `Item::score` changes after creation.

pub mod cursor;
pub mod item;
pub mod key;
pub mod validation;
pub mod vote;
