//! The relational mapping collaborator.
//!
//! The sharding layer never talks to storage directly. It binds a [`Table`]
//! handle per shard through a [`Mapper`] and issues inserts, matched updates
//! and deletes against it. [`MemoryStore`] is the in-process implementation
//! used by tests and embedded deployments.

mod memory;
mod snapshot;

use crate::error::Result;
use crate::value::{Row, Value};
use std::sync::Arc;

pub use memory::MemoryStore;

/// Row selector for updates and deletes.
///
/// Always matches on the primary key. When `version` is set the row must also
/// hold the expected lock version, which turns the write into a conditional
/// (optimistic) one.
#[derive(Debug, Clone, PartialEq)]
pub struct RowMatch {
  pub id: i64,
  pub version: Option<(String, Value)>,
}

impl RowMatch {
  pub fn id(id: i64) -> Self {
    Self { id, version: None }
  }

  pub fn versioned(id: i64, column: impl Into<String>, expected: impl Into<Value>) -> Self {
    Self {
      id,
      version: Some((column.into(), expected.into())),
    }
  }
}

/// A handle bound to one physical table.
pub trait Table: Send + Sync {
  fn name(&self) -> &str;

  /// Inserts a row and returns its primary key. A caller-provided id is kept,
  /// otherwise the table generates one.
  fn insert(&self, id: Option<i64>, row: &Row) -> Result<i64>;

  /// Applies `changes` to matching rows and returns the affected-row count.
  fn update(&self, filter: &RowMatch, changes: &Row) -> Result<u64>;

  /// Deletes matching rows and returns the affected-row count.
  fn delete(&self, filter: &RowMatch) -> Result<u64>;

  fn find(&self, id: i64) -> Result<Option<Row>>;

  fn count(&self) -> Result<u64>;

  /// All rows ordered by primary key.
  fn scan(&self) -> Result<Vec<(i64, Row)>>;
}

/// Binds table handles by name.
pub trait Mapper: Send + Sync {
  /// Binds a handle to `table_name`. Fails if the table does not exist.
  fn bind(&self, table_name: &str) -> Result<Arc<dyn Table>>;
}
